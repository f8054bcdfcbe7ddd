use crate::edge::EdgeDetector;
use crate::module::{Module, Port, Ports, ProcessContext, Signal};

/// Divisors of [`ClockDivider`], in output order.
pub const DIVISORS: [u32; 7] = [2, 3, 4, 6, 8, 12, 16];

const OUTPUTS: [&str; 7] = ["1/2", "1/3", "1/4", "1/6", "1/8", "1/12", "1/16"];

/// Emits a one-sample pulse on output `1/n` every `n` rising clock edges.
#[derive(Clone, Debug, Default)]
pub struct ClockDivider {
    clock: EdgeDetector,
    counts: [u32; 7],
}

impl ClockDivider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.counts = [0; 7];
    }

    /// Feed one clock sample, writing the pulse for each divisor into `pulses`.
    pub fn tick(&mut self, clock: Signal, pulses: &mut [Signal]) {
        pulses.fill(0.0);
        if !self.clock.process(clock) {
            return;
        }
        for ((count, &divisor), pulse) in self.counts.iter_mut().zip(&DIVISORS).zip(pulses) {
            *count += 1;
            if *count >= divisor {
                *count = 0;
                *pulse = 1.0;
            }
        }
    }
}

impl Module for ClockDivider {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![Port::new("clock")],
            OUTPUTS.iter().copied().map(Port::new).collect(),
        )
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        self.tick(inputs[0], outputs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_edges() {
        let mut div = ClockDivider::new();
        let mut pulses = [0.0; 7];
        let mut totals = [0u32; 7];
        for _ in 0..16 {
            for level in [1.0, 0.0] {
                div.tick(level, &mut pulses);
                for (t, p) in totals.iter_mut().zip(&pulses) {
                    *t += *p as u32;
                }
            }
        }
        assert_eq!(totals, [8, 5, 4, 2, 2, 1, 1]);
    }

    #[test]
    fn pulses_last_one_sample() {
        let mut div = ClockDivider::new();
        let mut pulses = [0.0; 7];
        div.tick(1.0, &mut pulses);
        div.tick(0.0, &mut pulses);
        div.tick(1.0, &mut pulses);
        assert_eq!(pulses[0], 1.0);
        div.tick(1.0, &mut pulses);
        assert_eq!(pulses, [0.0; 7]);
    }

    #[test]
    fn reset_restarts_counting() {
        let mut div = ClockDivider::new();
        let mut pulses = [0.0; 7];
        div.tick(1.0, &mut pulses);
        div.reset();
        div.tick(0.0, &mut pulses);
        div.tick(1.0, &mut pulses);
        assert_eq!(pulses[0], 0.0);
    }
}
