//! Step sequencers.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::edge::EdgeDetector;
use crate::module::{Module, Port, Ports, ProcessContext, Signal};
use crate::param::{ParamError, ParamTable, Parameter, Value};

/// Steps per pattern.
pub const STEPS: usize = 8;

const CLOCK: usize = 0;
const RESET: usize = 1;
const RANDOMIZE: usize = 2;

/// Eight-step pitch/velocity sequencer.
///
/// Every rising edge on `clock` advances one step; `reset` returns to step
/// zero and `randomize` rolls new steps. Randomize modes: `1` pitch (30..120),
/// `2` velocity (0..1), `0` both.
pub struct Sequencer {
    clock: EdgeDetector,
    reset: EdgeDetector,
    randomize: EdgeDetector,
    index: usize,
    pitch: [f32; STEPS],
    velocity: [f32; STEPS],
    rng: StdRng,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// A sequencer with a reproducible random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            clock: EdgeDetector::new(),
            reset: EdgeDetector::new(),
            randomize: EdgeDetector::new(),
            index: 0,
            pitch: [0.0; STEPS],
            velocity: [0.0; STEPS],
            rng,
        }
    }

    pub fn with_steps(mut self, pitch: [f32; STEPS], velocity: [f32; STEPS]) -> Self {
        self.pitch = pitch;
        self.velocity = velocity;
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pitch(&self) -> &[f32; STEPS] {
        &self.pitch
    }

    pub fn velocity(&self) -> &[f32; STEPS] {
        &self.velocity
    }
}

impl Module for Sequencer {
    fn ports(&self) -> Ports {
        Ports::named(&["clock", "reset", "randomize"], &["pitch", "velocity"])
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        if self.randomize.process(inputs[RANDOMIZE]) {
            Module::randomize(self, 0);
        }
        if self.reset.process(inputs[RESET]) {
            self.index = 0;
        }
        if self.clock.process(inputs[CLOCK]) {
            self.index = (self.index + 1) % STEPS;
        }
        outputs[0] = self.pitch[self.index];
        outputs[1] = self.velocity[self.index];
    }

    fn randomize(&mut self, mode: u32) {
        for i in 0..STEPS {
            if mode == 0 || mode == 1 {
                self.pitch[i] = self.rng.gen_range(30.0..=120.0);
            }
            if mode == 0 || mode == 2 {
                self.velocity[i] = self.rng.gen_range(0.0..=1.0);
            }
        }
    }
}

/// How long the gate stays open on a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateMode {
    #[default]
    Off,
    /// Open for `gatelen` seconds after the clock edge.
    Short,
    /// Open for the whole step.
    Long,
}

impl GateMode {
    fn from_index(i: u32) -> Self {
        match i {
            0 => GateMode::Off,
            1 => GateMode::Short,
            _ => GateMode::Long,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub pitch: f32,
    pub velocity: f32,
    /// Clock edges the step holds for; 0 counts as 1.
    pub repeat: u32,
    pub gate: GateMode,
    /// Glide into this step's pitch instead of jumping.
    pub slide: bool,
}

impl Default for Step {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            velocity: 0.0,
            repeat: 1,
            gate: GateMode::Off,
            slide: false,
        }
    }
}

mod out {
    pub const PITCH: usize = 0;
    pub const GATE: usize = 1;
    pub const VELOCITY: usize = 2;
    pub const INDEX: usize = 3;
    pub const END: usize = 4;
    pub const STEP0: usize = 5;
}

/// Eight-step sequencer with per-step repeats, gate modes and slides.
///
/// Outputs `pitch`, `gate`, `velocity`, `index`, `end` (pulses when the
/// pattern wraps) and `step0`..`step7` (pulse when that step begins).
///
/// Parameters:
/// - `gatelen`: seconds a [`GateMode::Short`] gate stays open (default 1.0)
/// - `slidetime`: seconds per unit of pitch while sliding (default 0.001)
///
/// Randomize modes: `1` pitch, `2` velocity, `3` repeats, `4` gate modes,
/// `5` slides, `0` all of them.
pub struct Metropolis {
    clock: EdgeDetector,
    reset: EdgeDetector,
    randomize: EdgeDetector,
    steps: [Step; STEPS],
    index: usize,
    repeats: u32,
    ticks: u64,
    pitch: f32,
    gate_length: f32,
    slide_time: f32,
    rng: StdRng,
}

static METROPOLIS_PARAMS: ParamTable<Metropolis> = ParamTable::new(&[
    Parameter {
        name: "gatelen",
        get: |m| Value::Float(m.gate_length),
        set: |m, v| {
            m.gate_length = f32::try_from(v)?.max(0.0);
            Ok(())
        },
    },
    Parameter {
        name: "slidetime",
        get: |m| Value::Float(m.slide_time),
        set: |m, v| {
            m.slide_time = f32::try_from(v)?.max(0.0);
            Ok(())
        },
    },
]);

impl Default for Metropolis {
    fn default() -> Self {
        Self::new()
    }
}

impl Metropolis {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            clock: EdgeDetector::new(),
            reset: EdgeDetector::new(),
            randomize: EdgeDetector::new(),
            steps: [Step::default(); STEPS],
            index: 0,
            repeats: 0,
            ticks: 0,
            pitch: 0.0,
            gate_length: 1.0,
            slide_time: 0.001,
            rng,
        }
    }

    pub fn with_steps(mut self, steps: [Step; STEPS]) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_gate_length(mut self, seconds: f32) -> Self {
        self.gate_length = seconds.max(0.0);
        self
    }

    pub fn with_slide_time(mut self, seconds: f32) -> Self {
        self.slide_time = seconds.max(0.0);
        self
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn steps(&self) -> &[Step; STEPS] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [Step; STEPS] {
        &mut self.steps
    }

    fn advance(&mut self, outputs: &mut [Signal]) {
        self.ticks = 0;
        if self.repeats >= self.steps[self.index].repeat.max(1) {
            self.repeats = 0;
            self.index = (self.index + 1) % STEPS;
            outputs[out::STEP0 + self.index] = 1.0;
            if self.index == 0 {
                outputs[out::END] = 1.0;
            }
        }
        self.repeats += 1;
    }
}

impl Module for Metropolis {
    fn ports(&self) -> Ports {
        let mut outputs: Vec<Port> = ["pitch", "gate", "velocity", "index", "end"]
            .into_iter()
            .map(Port::new)
            .collect();
        outputs.extend((0..STEPS).map(|i| Port::from(format!("step{}", i))));
        Ports::new(
            ["clock", "reset", "randomize"].into_iter().map(Port::new).collect(),
            outputs,
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        if self.randomize.process(inputs[RANDOMIZE]) {
            Module::randomize(self, 0);
        }
        if self.reset.process(inputs[RESET]) {
            self.index = 0;
            self.repeats = 0;
        }

        outputs[out::END] = 0.0;
        outputs[out::STEP0..out::STEP0 + STEPS].fill(0.0);

        if self.clock.process(inputs[CLOCK]) {
            self.advance(outputs);
        }

        let step = self.steps[self.index];
        if step.slide {
            let speed = 1.0 / (ctx.sample_rate * self.slide_time);
            self.pitch += (step.pitch - self.pitch).clamp(-speed, speed);
        } else {
            self.pitch = step.pitch;
        }
        outputs[out::PITCH] = self.pitch;
        outputs[out::VELOCITY] = step.velocity;

        let open = match step.gate {
            GateMode::Off => false,
            GateMode::Short => (self.ticks as f32) < self.gate_length * ctx.sample_rate,
            GateMode::Long => true,
        };
        outputs[out::GATE] = if open { 1.0 } else { 0.0 };
        outputs[out::INDEX] = self.index as f32;
        self.ticks += 1;
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        METROPOLIS_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        METROPOLIS_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        METROPOLIS_PARAMS.set(self, name, value)
    }

    fn randomize(&mut self, mode: u32) {
        let all = mode == 0;
        for step in &mut self.steps {
            if all || mode == 1 {
                step.pitch = self.rng.gen_range(30.0..=500.0);
            }
            if all || mode == 2 {
                step.velocity = self.rng.gen_range(0.1..=1.0);
            }
            if all || mode == 3 {
                step.repeat = self.rng.gen_range(1.0f32..=3.0) as u32;
            }
            if all || mode == 4 {
                let roll: f32 = self.rng.gen_range(0.45..=3.0);
                step.gate = GateMode::from_index(roll.clamp(0.0, 2.0) as u32);
            }
            if all || mode == 5 {
                step.slide = self.rng.gen_range(0.0f32..=0.8) > 0.5;
            }
        }
    }
}
