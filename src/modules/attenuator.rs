use crate::module::{Module, Port, Ports, ProcessContext, Signal};

/// Scales and offsets a signal: `output = input * gain + offset`.
///
/// `gain` (default 0.5) and `offset` are smoothed towards their inputs so
/// that stepped control changes do not click.
#[derive(Clone, Debug)]
pub struct Attenuator {
    gain: f32,
    offset: f32,
}

impl Default for Attenuator {
    fn default() -> Self {
        Self::new()
    }
}

impl Attenuator {
    pub fn new() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

impl Module for Attenuator {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![
                Port::new("input"),
                Port::new("gain").with_default(0.5),
                Port::new("offset"),
            ],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let k = (1000.0 / ctx.sample_rate).clamp(0.0, 1.0);
        self.gain += (inputs[1] - self.gain) * k;
        self.offset += (inputs[2] - self.offset) * k;
        outputs[0] = inputs[0] * self.gain + self.offset;
    }
}
