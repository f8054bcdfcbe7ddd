use crate::module::Signal;

/// Rising-edge trigger.
///
/// Fires once when the input rises, and re-arms only after it falls again.
/// A slow ramp therefore fires once at its start, not on every sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeDetector {
    last: Signal,
    armed: bool,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EdgeDetector {
    pub const fn new() -> Self {
        Self {
            last: 0.0,
            armed: true,
        }
    }

    /// Feed one sample; `true` if it is a rising edge.
    #[inline]
    pub fn process(&mut self, input: Signal) -> bool {
        let fired = input > self.last && self.armed;
        if fired {
            self.armed = false;
        }
        if input < self.last {
            self.armed = true;
        }
        self.last = input;
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(edge: &mut EdgeDetector, seq: &[f32]) -> usize {
        seq.iter().filter(|&&x| edge.process(x)).count()
    }

    #[test]
    fn pulse_train_fires_on_each_rise() {
        let mut edge = EdgeDetector::new();
        assert_eq!(count(&mut edge, &[0., 1., 0., 1., 0., 1.]), 3);
    }

    #[test]
    fn ramp_fires_once() {
        let mut edge = EdgeDetector::new();
        assert_eq!(count(&mut edge, &[0.1, 0.2, 0.3, 0.4]), 1);
    }

    #[test]
    fn plateau_does_not_refire() {
        let mut edge = EdgeDetector::new();
        assert!(edge.process(1.0));
        assert!(!edge.process(1.0));
        assert!(!edge.process(1.0));
        assert!(!edge.process(0.0));
        assert!(edge.process(1.0));
    }

    #[test]
    fn negative_input_never_fires() {
        let mut edge = EdgeDetector::new();
        assert_eq!(count(&mut edge, &[-1.0, -2.0, -3.0]), 0);
    }
}
