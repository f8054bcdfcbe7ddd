//! mdlr - a per-sample modular signal graph with message-passing control
//!
//! Design principles:
//! - Modules expose named scalar terminals and are processed one frame at a time
//! - Groups own their children and the slot storage that wires them together;
//!   a group is itself a module, so patches nest
//! - The sample rate travels in [`ProcessContext`], never as global state
//! - Once a system is running, it is reached only through a lock-free
//!   [`Controller`](control::Controller) queue of textual commands
//!
//! # Quick Start
//!
//! ```
//! use mdlr::driver::{DriverConfig, HeadlessDriver};
//! use mdlr::modules::{Attenuator, Oscillator};
//! use mdlr::Engine;
//!
//! let mut engine = Engine::new(HeadlessDriver::new(0, 1), &DriverConfig::default())?;
//! let system = engine.system_mut().unwrap();
//! system.add("osc", Oscillator::new())?;
//! system.add("vca", Attenuator::new())?;
//! system.connect("osc.output", "vca.input")?;
//! system.connect("vca.output", "out-0")?;
//!
//! engine.start()?;
//! engine.controller().unwrap().submit("vca.gain = 0.25").unwrap();
//! engine.stop()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! With the `cpal_sink` feature, `driver::CpalDriver` plays the same system
//! on a hardware device.

mod edge;
mod group;
mod module;

pub mod control;
pub mod driver;
pub mod engine;
pub mod modules;
pub mod param;
pub mod signal;

pub use edge::EdgeDetector;
pub use engine::{Engine, EngineError, Renderer, VolumeRamp};
pub use group::{Destination, Group, PatchError, Source};
pub use module::{Module, Port, Ports, ProcessContext, Signal};
pub use param::Value;
