//! Example: Creating a custom module
//!
//! This demonstrates how to implement the `Module` trait to create your own
//! signal processing modules, with terminals for modulation and a named
//! parameter for settings that are not signals.
//!
//! Run with: cargo run --example custom_module --features cpal_sink
//! (without the feature it renders on a software clock)

use std::error::Error;
use std::thread::sleep;
use std::time::{Duration, Instant};

use mdlr::driver::{Driver, DriverConfig};
use mdlr::modules::{Attenuator, Oscillator};
use mdlr::param::{ParamError, ParamTable, Parameter, Value, ValueError};
use mdlr::{Engine, Module, Port, Ports, ProcessContext, Signal};

// =============================================================================
// Step 1: Define your module struct with internal state
// =============================================================================

/// A square wave oscillator with variable pulse width
pub struct Square {
    phase: f32,
    /// Output level, a parameter rather than a terminal
    amplitude: f32,
}

impl Square {
    pub fn new() -> Self {
        Self {
            phase: 0.0,
            amplitude: 0.25, // -12dB, safe default
        }
    }
}

// =============================================================================
// Step 2: Describe its parameters
// =============================================================================

static SQUARE_PARAMS: ParamTable<Square> = ParamTable::new(&[Parameter {
    name: "amplitude",
    get: |s| Value::Float(s.amplitude),
    set: |s, v| {
        let amplitude = f32::try_from(v)?;
        if !(0.0..=1.0).contains(&amplitude) {
            return Err(ValueError::Range(format!("{} is outside 0..1", amplitude)));
        }
        s.amplitude = amplitude;
        Ok(())
    },
}]);

// =============================================================================
// Step 3: Implement Module
// =============================================================================

impl Module for Square {
    // Inputs first, outputs second; the slices handed to `process` follow
    // this order.
    fn ports(&self) -> Ports {
        Ports::new(
            vec![
                Port::new("frequency").with_default(220.0),
                Port::new("width").with_default(0.5),
            ],
            vec![Port::new("output")],
        )
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        let frequency = inputs[0].max(0.0);
        let width = inputs[1].clamp(0.0, 1.0);

        // Square wave: high when phase < width, low otherwise
        outputs[0] = if self.phase < width {
            self.amplitude
        } else {
            -self.amplitude
        };

        // Advance and wrap phase
        self.phase = (self.phase + frequency / ctx.sample_rate).fract();
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        SQUARE_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        SQUARE_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        SQUARE_PARAMS.set(self, name, value)
    }
}

#[cfg(feature = "cpal_sink")]
fn driver() -> Box<dyn Driver> {
    Box::new(mdlr::driver::CpalDriver::new())
}

#[cfg(not(feature = "cpal_sink"))]
fn driver() -> Box<dyn Driver> {
    Box::new(mdlr::driver::HeadlessDriver::new(0, 2))
}

// =============================================================================
// Main: Use the custom module just like built-in ones
// =============================================================================

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let mut engine = Engine::new(driver(), &DriverConfig::default())?;
    println!("Using {:?}", engine.info());

    let system = engine.system_mut().ok_or("engine already started")?;

    // A slow sine sweeps the pulse width between 0.25 and 0.75
    system.add("lfo", Oscillator::new())?;
    system.add("depth", Attenuator::new())?;
    system.add("square", Square::new())?;
    system.connect("lfo.output", "depth.input")?;
    system.connect("depth.output", "square.width")?;
    for i in 0..system.output_count() {
        system.connect("square.output", &format!("out-{}", i))?;
    }

    // Constant inputs are just terminals nobody drives
    *system.find_input_mut("lfo.frequency").ok_or("no lfo")? = 0.5;
    *system.find_input_mut("depth.gain").ok_or("no depth")? = 0.25;
    *system.find_input_mut("depth.offset").ok_or("no depth")? = 0.5;
    print!("{}", system.describe());

    engine.start()?;
    println!("Playing square wave with PWM modulation for 10 seconds\n");

    // Slowly modulate frequency for a siren effect, through the control queue
    let start = Instant::now();
    let controller = engine.controller().ok_or("engine not running")?;
    while start.elapsed() < Duration::from_secs(10) {
        let elapsed = start.elapsed().as_secs_f32();
        let freq = 220.0 + 110.0 * (elapsed * 0.2).sin();
        controller
            .submit(&format!("square.frequency = {}", freq))
            .ok();
        sleep(Duration::from_millis(10));
    }
    controller.submit("square.amplitude = 0.1").ok();
    sleep(Duration::from_millis(500));

    engine.stop()?;
    Ok(())
}
