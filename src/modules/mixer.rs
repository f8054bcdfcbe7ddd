use crate::module::{Module, Port, Ports, ProcessContext, Signal};

/// Sums `inN * volumeN` over its channels, clamped to `[-1, 1]`.
///
/// Inputs are laid out as `in0..inN` followed by `volume0..volumeN`.
#[derive(Clone, Copy, Debug)]
pub struct Mixer {
    channels: usize,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Mixer {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Module for Mixer {
    fn ports(&self) -> Ports {
        let levels = (0..self.channels).map(|i| Port::from(format!("in{}", i)));
        let volumes = (0..self.channels).map(|i| Port::from(format!("volume{}", i)));
        Ports::new(levels.chain(volumes).collect(), vec![Port::new("output")])
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let (levels, volumes) = inputs.split_at(self.channels);
        let sum: f32 = levels.iter().zip(volumes).map(|(x, v)| x * v).sum();
        outputs[0] = sum.clamp(-1.0, 1.0);
    }
}
