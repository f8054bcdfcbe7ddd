use crate::module::{Module, Port, Ports, ProcessContext, Signal};

const GATE: usize = 0;
const ATTACK: usize = 1;
const DECAY: usize = 2;
const SUSTAIN: usize = 3;
const RELEASE: usize = 4;

const MIN_TIME: f32 = 1e-5;
const MAX_TIME: f32 = 128.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Envelope times in seconds and sustain level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Adsr {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Adsr {
    /// Times clamped to `[1e-5, 128]` seconds, sustain to `[0, 1]`.
    pub fn clamped(self) -> Self {
        Self {
            attack: self.attack.clamp(MIN_TIME, MAX_TIME),
            decay: self.decay.clamp(MIN_TIME, MAX_TIME),
            sustain: self.sustain.clamp(0.0, 1.0),
            release: self.release.clamp(MIN_TIME, MAX_TIME),
        }
    }
}

/// Linear ADSR envelope generator.
///
/// Inputs `gate`, `a`, `d`, `s`, `r`; output `output` in `[0, 1]`. The gate is
/// on while its input is above 0.5. Times are read every sample, so they can
/// be modulated.
#[derive(Clone, Debug)]
pub struct Envelope {
    stage: Stage,
    value: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

impl Envelope {
    pub fn new() -> Self {
        Self {
            stage: Stage::Attack,
            value: 0.0,
        }
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Advance by one sample.
    pub fn step(&mut self, gate: bool, adsr: Adsr, sample_rate: f32) -> f32 {
        let Adsr {
            attack,
            decay,
            sustain,
            release,
        } = adsr.clamped();
        let rise = 1.0 / (attack * sample_rate);
        let fall = 1.0 / (release * sample_rate);

        match (self.stage, gate) {
            (Stage::Attack, true) => {
                self.value += rise;
                if self.value >= 1.0 {
                    self.stage = Stage::Decay;
                }
            }
            (Stage::Decay, true) => {
                self.value -= 1.0 / (decay * sample_rate);
                if self.value <= sustain {
                    self.value = sustain;
                    self.stage = Stage::Sustain;
                }
            }
            (Stage::Sustain, true) => self.value = sustain,
            (Stage::Release, true) => {
                self.stage = Stage::Attack;
                self.value += rise;
            }
            (Stage::Release, false) => self.value -= fall,
            (_, false) => {
                self.stage = Stage::Release;
                self.value -= fall;
            }
        }

        self.value = self.value.clamp(0.0, 1.0);
        self.value
    }
}

impl Module for Envelope {
    fn ports(&self) -> Ports {
        Ports::new(
            vec![
                Port::new("gate"),
                Port::new("a").with_default(0.01),
                Port::new("d").with_default(0.1),
                Port::new("s").with_default(0.5),
                Port::new("r").with_default(0.2),
            ],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let adsr = Adsr {
            attack: inputs[ATTACK],
            decay: inputs[DECAY],
            sustain: inputs[SUSTAIN],
            release: inputs[RELEASE],
        };
        outputs[0] = self.step(inputs[GATE] > 0.5, adsr, ctx.sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Adsr = Adsr {
        attack: 0.01,
        decay: 0.01,
        sustain: 0.5,
        release: 0.01,
    };

    #[test]
    fn one_sample_attack_then_decay() {
        let mut env = Envelope::new();
        assert_eq!(env.step(true, FAST, 100.0), 1.0);
        assert_eq!(env.stage(), Stage::Decay);
        assert_eq!(env.step(true, FAST, 100.0), 0.5);
        assert_eq!(env.stage(), Stage::Sustain);
        assert_eq!(env.step(true, FAST, 100.0), 0.5);
    }

    #[test]
    fn release_falls_to_zero() {
        let mut env = Envelope::new();
        env.step(true, FAST, 100.0);
        env.step(true, FAST, 100.0);
        assert_eq!(env.step(false, FAST, 100.0), 0.0);
        assert_eq!(env.stage(), Stage::Release);
        assert_eq!(env.step(false, FAST, 100.0), 0.0);
    }

    #[test]
    fn retrigger_from_release_restarts_attack() {
        let slow = Adsr {
            attack: 1.0,
            decay: 1.0,
            sustain: 0.5,
            release: 1.0,
        };
        let mut env = Envelope::new();
        for _ in 0..50 {
            env.step(true, slow, 100.0);
        }
        let peak = env.value();
        env.step(false, slow, 100.0);
        assert_eq!(env.stage(), Stage::Release);
        let v = env.step(true, slow, 100.0);
        assert_eq!(env.stage(), Stage::Attack);
        assert!((v - peak).abs() < 1e-4);
    }

    #[test]
    fn sustain_tracks_level_changes() {
        let mut env = Envelope::new();
        env.step(true, FAST, 100.0);
        env.step(true, FAST, 100.0);
        let lower = Adsr { sustain: 0.25, ..FAST };
        assert_eq!(env.step(true, lower, 100.0), 0.25);
    }

    #[test]
    fn out_of_range_times_are_clamped() {
        let mut env = Envelope::new();
        let silly = Adsr {
            attack: -5.0,
            decay: 0.0,
            sustain: 3.0,
            release: 1e9,
        };
        let v = env.step(true, silly, 48_000.0);
        assert!((0.0..=1.0).contains(&v));
    }

    #[test]
    fn module_ports() {
        let env = Envelope::new();
        let ports = env.ports();
        let names: Vec<_> = ports.inputs.iter().map(|p| p.name.as_ref()).collect();
        assert_eq!(names, ["gate", "a", "d", "s", "r"]);
        assert_eq!(ports.outputs[0].name, "output");
    }
}
