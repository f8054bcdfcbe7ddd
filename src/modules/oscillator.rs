use std::f32::consts::TAU;

use crate::module::{Module, Port, Ports, ProcessContext, Signal};

/// Sine oscillator.
///
/// Input `frequency` in Hz (default 120), output `output` in `[-1, 1]`.
#[derive(Clone, Debug, Default)]
pub struct Oscillator {
    phase: f32,
}

impl Oscillator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase in radians, in `[0, TAU)`.
    #[inline]
    pub fn phase(&self) -> f32 {
        self.phase
    }
}

impl Module for Oscillator {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![Port::new("frequency").with_default(120.0)],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        outputs[0] = self.phase.sin();
        self.phase = (self.phase + TAU * inputs[0] / ctx.sample_rate).rem_euclid(TAU);
        if !self.phase.is_finite() {
            self.phase = 0.0;
        }
    }
}
