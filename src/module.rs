//! Core module trait and context types.

use std::borrow::Cow;

use crate::group::Group;
use crate::param::{ParamError, Value};

/// A scalar signal value carried by a terminal.
pub type Signal = f32;

/// Information available during signal processing.
///
/// Passed to every [`Module::process`] call. The sample rate is always handed
/// down explicitly; nothing in the crate keeps it as ambient state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz (e.g. 44100.0, 48000.0)
    pub sample_rate: f32,
}

impl ProcessContext {
    pub fn new(sample_rate: f32) -> Self {
        Self { sample_rate }
    }
}

/// Declaration of a single input or output terminal.
#[derive(Clone, Debug, PartialEq)]
pub struct Port {
    pub name: Cow<'static, str>,
    /// Value the terminal holds before anything writes to it.
    pub default: Signal,
}

impl Port {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name: Cow::Borrowed(name),
            default: 0.0,
        }
    }

    pub fn with_default(mut self, default: Signal) -> Self {
        self.default = default;
        self
    }

    /// `count` ports named `{base}-0`, `{base}-1`, ...
    pub fn numbered(base: &str, count: usize) -> Vec<Port> {
        (0..count)
            .map(|i| Port::from(format!("{}-{}", base, i)))
            .collect()
    }
}

impl From<&'static str> for Port {
    fn from(name: &'static str) -> Self {
        Port::new(name)
    }
}

impl From<String> for Port {
    fn from(name: String) -> Self {
        Self {
            name: Cow::Owned(name),
            default: 0.0,
        }
    }
}

/// The ordered terminals a module exposes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ports {
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Ports {
    pub fn new(inputs: Vec<Port>, outputs: Vec<Port>) -> Self {
        Self { inputs, outputs }
    }

    /// Ports with zero defaults, named in order.
    pub fn named(inputs: &[&'static str], outputs: &[&'static str]) -> Self {
        Self {
            inputs: inputs.iter().copied().map(Port::new).collect(),
            outputs: outputs.iter().copied().map(Port::new).collect(),
        }
    }
}

/// The core trait for signal processing modules.
///
/// A module declares its terminals once through [`ports`](Module::ports) and
/// is then driven by its owning [`Group`], one call to
/// [`process`](Module::process) per sample frame. The group owns the terminal
/// storage: `inputs` and `outputs` are this module's slices of it, in the
/// order declared by `ports()`.
///
/// ```
/// use mdlr::{Module, Ports, ProcessContext, Signal};
///
/// struct Invert;
///
/// impl Module for Invert {
///     fn ports(&self) -> Ports {
///         Ports::named(&["input"], &["output"])
///     }
///
///     fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
///         outputs[0] = -inputs[0];
///     }
/// }
/// ```
///
/// `process` must only depend on `inputs` and the module's own state, and
/// must never block or panic: out-of-range inputs are clamped.
pub trait Module: Send + 'static {
    /// Terminals of this module. Called once, when the module is added to a group.
    fn ports(&self) -> Ports;

    /// Process one sample frame.
    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]);

    /// Names of the parameters this module exposes.
    fn parameter_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Read a parameter by name.
    fn parameter(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Write a parameter by name.
    fn set_parameter(&mut self, name: &str, _value: Value) -> Result<(), ParamError> {
        Err(ParamError::Unknown(name.to_string()))
    }

    /// Regenerate internal state. The meaning of `mode` is module specific;
    /// `0` always means "everything".
    fn randomize(&mut self, _mode: u32) {}

    /// Called once when the module is inserted into a group.
    fn attach(&mut self) {}

    fn as_group(&self) -> Option<&Group> {
        None
    }

    fn as_group_mut(&mut self) -> Option<&mut Group> {
        None
    }
}
