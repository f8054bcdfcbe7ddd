use crate::module::{Module, Port, Ports, ProcessContext, Signal};

/// Logistic soft switch: `1 / (1 + e^(-k x))`.
///
/// Inputs `input` and `k` (steepness, default 3); output `output`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sigmoid;

impl Module for Sigmoid {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![Port::new("input"), Port::new("k").with_default(3.0)],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let y = 1.0 / (1.0 + (-inputs[1] * inputs[0]).exp());
        outputs[0] = y.clamp(-1.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_and_saturation() {
        let ctx = ProcessContext::new(1.0);
        let mut out = [0.0];
        Sigmoid.process(&ctx, &[0.0, 3.0], &mut out);
        assert_eq!(out[0], 0.5);
        Sigmoid.process(&ctx, &[100.0, 3.0], &mut out);
        assert_eq!(out[0], 1.0);
        Sigmoid.process(&ctx, &[-100.0, 3.0], &mut out);
        assert!(out[0] < 1e-6);
    }
}
