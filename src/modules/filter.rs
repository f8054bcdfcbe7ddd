use crate::module::{Module, Ports, ProcessContext, Signal};

/// Two-pole resonant filter after Paul Kellett's classic design.
///
/// Inputs `input`, `cutoff` (0..1, normalized) and `resonance` (0..1);
/// outputs `lowpass`, `bandpass` and `highpass`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KellettFilter {
    a: f32,
    b: f32,
}

impl KellettFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Module for KellettFilter {
    fn ports(&self) -> Ports {
        Ports::named(
            &["input", "cutoff", "resonance"],
            &["lowpass", "bandpass", "highpass"],
        )
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let input = inputs[0];
        let cutoff = inputs[1].clamp(0.0, 0.99);
        let resonance = inputs[2].clamp(0.0, 1.0);
        let feedback = resonance + resonance / (1.0 - cutoff);

        self.a += cutoff * (input - self.a + feedback * (self.a - self.b));
        self.b += cutoff * (self.a - self.b);
        self.a = self.a.clamp(-4.0, 4.0);
        self.b = self.b.clamp(-4.0, 4.0);

        outputs[0] = self.b;
        outputs[1] = self.a - self.b;
        outputs[2] = input - self.a;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: ProcessContext = ProcessContext { sample_rate: 48_000.0 };

    #[test]
    fn lowpass_settles_on_dc() {
        let mut filter = KellettFilter::new();
        let mut out = [0.0; 3];
        for _ in 0..1_000 {
            filter.process(&CTX, &[1.0, 0.2, 0.0], &mut out);
        }
        assert!((out[0] - 1.0).abs() < 1e-3);
        assert!(out[1].abs() < 1e-3);
        assert!(out[2].abs() < 1e-3);
    }

    #[test]
    fn zero_cutoff_blocks_everything() {
        let mut filter = KellettFilter::new();
        let mut out = [0.0; 3];
        filter.process(&CTX, &[1.0, 0.0, 0.5], &mut out);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[2], 1.0);
    }

    #[test]
    fn full_resonance_stays_bounded() {
        let mut filter = KellettFilter::new();
        let mut out = [0.0; 3];
        for i in 0..10_000 {
            let x = if (i / 50) % 2 == 0 { 1.0 } else { -1.0 };
            filter.process(&CTX, &[x, 0.99, 1.0], &mut out);
            assert!(out.iter().all(|v| v.is_finite()));
        }
    }
}
