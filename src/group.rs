//! Composite modules.
//!
//! A [`Group`] owns an ordered list of child modules plus the slot arena that
//! holds every terminal of those children. Connections live inside the group
//! that owns both ends; a group nested inside another appears to its parent
//! as an ordinary module whose ports are the group's boundary terminals.

use std::fmt::{self, Write};

use hashbrown::HashMap;
use tracing::trace;

use crate::module::{Module, Port, Ports, ProcessContext, Signal};
use crate::param::{ParamError, Value};
use crate::signal::{Signals, SlotId, SlotRange};

/// Errors raised while building or addressing a patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    /// No module, terminal or parameter at this path.
    NotFound(String),
    /// A child or boundary port with this name already exists.
    DuplicateName(String),
    /// Names must be non-empty and contain no `.`.
    InvalidName(String),
    /// The destination already has a source.
    FanIn { destination: String, existing: String },
    NotConnected { from: String, to: String },
    /// Boundary ports cannot change once the group has been attached to a parent.
    Sealed,
    Parameter { path: String, source: ParamError },
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::NotFound(path) => write!(f, "nothing found at '{}'", path),
            PatchError::DuplicateName(name) => write!(f, "name '{}' is already taken", name),
            PatchError::InvalidName(name) => write!(f, "invalid name '{}'", name),
            PatchError::FanIn {
                destination,
                existing,
            } => write!(
                f,
                "'{}' is already driven by '{}'",
                destination, existing
            ),
            PatchError::NotConnected { from, to } => {
                write!(f, "'{}' is not connected to '{}'", from, to)
            }
            PatchError::Sealed => f.write_str("group ports are fixed once it has a parent"),
            PatchError::Parameter { path, source } => write!(f, "{}: {}", path, source),
        }
    }
}

impl std::error::Error for PatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PatchError::Parameter { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A slot that may drive connections: a boundary input or a child output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Source(SlotId);

/// A slot that may be driven: a boundary output or a child input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Destination(SlotId);

struct Child {
    name: String,
    module: Box<dyn Module>,
    inputs: SlotRange,
    outputs: SlotRange,
}

fn check_name(name: &str) -> Result<(), PatchError> {
    if name.is_empty() || name.contains('.') {
        Err(PatchError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// An ordered collection of modules wired through a shared slot arena.
///
/// Children run in insertion order. A connection from an earlier child to a
/// later one delivers its value within the same frame; a connection back to
/// an earlier child arrives one frame later.
///
/// ```
/// use mdlr::{Group, ProcessContext};
/// use mdlr::modules::{Attenuator, Oscillator};
///
/// let mut voice = Group::new();
/// voice.add_input("pitch")?;
/// voice.add_output("out")?;
/// voice.add("osc", Oscillator::new())?;
/// voice.add("vca", Attenuator::new())?;
/// voice.connect("pitch", "osc.frequency")?;
/// voice.connect("osc.output", "vca.input")?;
/// voice.connect("vca.output", "out")?;
///
/// let ctx = ProcessContext::new(48_000.0);
/// let mut out = [0.0];
/// voice.process_frame(&ctx, &[220.0], &mut out);
/// # Ok::<(), mdlr::PatchError>(())
/// ```
#[derive(Default)]
pub struct Group {
    signals: Signals,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    boundary_in: Vec<SlotId>,
    boundary_out: Vec<SlotId>,
    children: Vec<Child>,
    index: HashMap<String, usize>,
    sealed: bool,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// A group with `inputs` boundary inputs named `in-N` and `outputs`
    /// boundary outputs named `out-N`, the shape of a device-facing root.
    pub fn with_io(inputs: usize, outputs: usize) -> Self {
        let mut group = Self::new();
        for port in Port::numbered("in", inputs) {
            group.push_input(port);
        }
        for port in Port::numbered("out", outputs) {
            group.push_output(port);
        }
        group
    }

    fn push_input(&mut self, port: Port) -> Source {
        let id = self.signals.alloc(&port);
        self.boundary_in.push(id);
        self.inputs.push(port);
        Source(id)
    }

    fn push_output(&mut self, port: Port) -> Destination {
        let id = self.signals.alloc(&port);
        self.boundary_out.push(id);
        self.outputs.push(port);
        Destination(id)
    }

    fn check_port_name(&self, ports: &[Port], name: &str) -> Result<(), PatchError> {
        if self.sealed {
            return Err(PatchError::Sealed);
        }
        check_name(name)?;
        if ports.iter().any(|p| p.name == name) {
            return Err(PatchError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    /// Add a boundary input. Inside the group it acts as a source.
    pub fn add_input(&mut self, port: impl Into<Port>) -> Result<Source, PatchError> {
        let port = port.into();
        self.check_port_name(&self.inputs, &port.name)?;
        Ok(self.push_input(port))
    }

    /// Add a boundary output. Inside the group it acts as a destination.
    pub fn add_output(&mut self, port: impl Into<Port>) -> Result<Destination, PatchError> {
        let port = port.into();
        self.check_port_name(&self.outputs, &port.name)?;
        Ok(self.push_output(port))
    }

    /// Insert a child module. Children are processed in insertion order.
    pub fn add<M: Module>(&mut self, name: &str, module: M) -> Result<(), PatchError> {
        self.add_boxed(name, Box::new(module))
    }

    pub fn add_boxed(&mut self, name: &str, mut module: Box<dyn Module>) -> Result<(), PatchError> {
        check_name(name)?;
        if self.index.contains_key(name) {
            return Err(PatchError::DuplicateName(name.to_string()));
        }
        let Ports { inputs, outputs } = module.ports();
        let inputs = self.signals.alloc_block(&inputs);
        let outputs = self.signals.alloc_block(&outputs);
        module.attach();
        self.index.insert(name.to_string(), self.children.len());
        self.children.push(Child {
            name: name.to_string(),
            module,
            inputs,
            outputs,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child names in processing order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.children.iter().map(|c| c.name.as_str())
    }

    pub fn input_count(&self) -> usize {
        self.boundary_in.len()
    }

    pub fn output_count(&self) -> usize {
        self.boundary_out.len()
    }

    fn child(&self, name: &str) -> Option<&Child> {
        self.index.get(name).map(|&i| &self.children[i])
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Child> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.children[i]),
            None => None,
        }
    }

    fn named_slot(&self, mut slots: impl Iterator<Item = SlotId>, name: &str) -> Option<SlotId> {
        slots.find(|&id| self.signals.name(id) == name)
    }

    /// Resolve a connection source: `"name"` for a boundary input, `"child.port"`
    /// for a child output.
    pub fn source(&self, path: &str) -> Result<Source, PatchError> {
        let slot = match path.split_once('.') {
            None => self.named_slot(self.boundary_in.iter().copied(), path),
            Some((child, port)) => self
                .child(child)
                .and_then(|c| self.named_slot(c.outputs.iter(), port)),
        };
        slot.map(Source)
            .ok_or_else(|| PatchError::NotFound(path.to_string()))
    }

    /// Resolve a connection destination: `"name"` for a boundary output,
    /// `"child.port"` for a child input.
    pub fn destination(&self, path: &str) -> Result<Destination, PatchError> {
        let slot = match path.split_once('.') {
            None => self.named_slot(self.boundary_out.iter().copied(), path),
            Some((child, port)) => self
                .child(child)
                .and_then(|c| self.named_slot(c.inputs.iter(), port)),
        };
        slot.map(Destination)
            .ok_or_else(|| PatchError::NotFound(path.to_string()))
    }

    /// Connect two terminals of this group by path.
    ///
    /// A destination accepts a single source; connecting a second one is an error.
    pub fn connect(&mut self, from: &str, to: &str) -> Result<(), PatchError> {
        let source = self.source(from)?;
        let destination = self.destination(to)?;
        self.link(source, destination)
    }

    pub fn link(&mut self, from: Source, to: Destination) -> Result<(), PatchError> {
        self.signals.connect(from.0, to.0).map_err(|existing| PatchError::FanIn {
            destination: self.signals.name(to.0).to_string(),
            existing: self.signals.name(existing).to_string(),
        })?;
        trace!(
            from = self.signals.name(from.0),
            to = self.signals.name(to.0),
            "connected"
        );
        Ok(())
    }

    pub fn disconnect(&mut self, from: &str, to: &str) -> Result<(), PatchError> {
        let source = self.source(from)?;
        let destination = self.destination(to)?;
        if self.signals.disconnect(source.0, destination.0) {
            Ok(())
        } else {
            Err(PatchError::NotConnected {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Process one frame without going through the [`Module`] trait.
    pub fn process_frame(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        for (&slot, &value) in self.boundary_in.iter().zip(inputs) {
            self.signals.set(slot, value);
        }
        for &slot in &self.boundary_in {
            self.signals.propagate(slot);
        }

        for child in &mut self.children {
            let (ins, outs) = self.signals.split_block(child.inputs, child.outputs);
            child.module.process(ctx, ins, outs);
            self.signals.propagate_range(child.outputs);
        }

        for (out, &slot) in outputs.iter_mut().zip(&self.boundary_out) {
            *out = self.signals.get(slot);
        }
    }

    /// The group that owns the terminal at `path`, and the path relative to it.
    fn scope<'a, 'p>(&'a self, path: &'p str) -> Option<(&'a Group, &'p str)> {
        match path.split_once('.') {
            Some((head, rest)) if rest.contains('.') => {
                self.child(head)?.module.as_group()?.scope(rest)
            }
            _ => Some((self, path)),
        }
    }

    fn scope_mut<'a, 'p>(&'a mut self, path: &'p str) -> Option<(&'a mut Group, &'p str)> {
        match path.split_once('.') {
            Some((head, rest)) if rest.contains('.') => {
                self.child_mut(head)?.module.as_group_mut()?.scope_mut(rest)
            }
            _ => Some((self, path)),
        }
    }

    /// An input terminal of this scope: own boundary input, or child input.
    fn local_input(&self, path: &str) -> Option<SlotId> {
        match path.split_once('.') {
            None => self.named_slot(self.boundary_in.iter().copied(), path),
            Some((child, port)) => self.named_slot(self.child(child)?.inputs.iter(), port),
        }
    }

    fn local_output(&self, path: &str) -> Option<SlotId> {
        match path.split_once('.') {
            None => self.named_slot(self.boundary_out.iter().copied(), path),
            Some((child, port)) => self.named_slot(self.child(child)?.outputs.iter(), port),
        }
    }

    /// Look up a module by dotted path, descending through nested groups.
    pub fn find_module(&self, path: &str) -> Option<&dyn Module> {
        match path.split_once('.') {
            None => self.child(path).map(|c| c.module.as_ref()),
            Some((head, rest)) => self.child(head)?.module.as_group()?.find_module(rest),
        }
    }

    pub fn find_module_mut(&mut self, path: &str) -> Option<&mut dyn Module> {
        match path.split_once('.') {
            None => self.child_mut(path).map(|c| c.module.as_mut()),
            Some((head, rest)) => self
                .child_mut(head)?
                .module
                .as_group_mut()?
                .find_module_mut(rest),
        }
    }

    /// Current value of the input terminal at `path`.
    pub fn find_input(&self, path: &str) -> Option<Signal> {
        let (scope, local) = self.scope(path)?;
        scope.local_input(local).map(|id| scope.signals.get(id))
    }

    pub fn find_input_mut(&mut self, path: &str) -> Option<&mut Signal> {
        let (scope, local) = self.scope_mut(path)?;
        let id = scope.local_input(local)?;
        Some(scope.signals.value_mut(id))
    }

    /// Current value of the output terminal at `path`.
    pub fn find_output(&self, path: &str) -> Option<Signal> {
        let (scope, local) = self.scope(path)?;
        scope.local_output(local).map(|id| scope.signals.get(id))
    }

    /// Read a parameter: `"module.param"`, with any number of leading group names.
    pub fn find_parameter(&self, path: &str) -> Option<Value> {
        match path.rsplit_once('.') {
            None => self.parameter(path),
            Some((module, name)) => self.find_module(module)?.parameter(name),
        }
    }

    pub fn write_parameter(&mut self, path: &str, value: Value) -> Result<(), PatchError> {
        let result = match path.rsplit_once('.') {
            None => self.set_parameter(path, value),
            Some((module, name)) => self
                .find_module_mut(module)
                .ok_or_else(|| PatchError::NotFound(path.to_string()))?
                .set_parameter(name, value),
        };
        result.map_err(|source| match source {
            ParamError::Unknown(_) => PatchError::NotFound(path.to_string()),
            source => PatchError::Parameter {
                path: path.to_string(),
                source,
            },
        })
    }

    /// Randomize the module at `path`; an empty path means this group.
    pub fn randomize_at(&mut self, path: &str, mode: u32) -> Result<(), PatchError> {
        if path.is_empty() {
            self.randomize(mode);
            return Ok(());
        }
        self.find_module_mut(path)
            .ok_or_else(|| PatchError::NotFound(path.to_string()))?
            .randomize(mode);
        Ok(())
    }

    /// A readable dump of the module tree with current terminal values.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_scope(&mut out, 0);
        out
    }

    fn describe_scope(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        for (port, &slot) in self.inputs.iter().zip(&self.boundary_in) {
            let _ = writeln!(out, "{}> {} = {:.3}", pad, port.name, self.signals.get(slot));
        }
        for child in &self.children {
            let _ = writeln!(out, "{}{}", pad, child.name);
            for id in child.inputs.iter() {
                let _ = writeln!(
                    out,
                    "{}  > {} = {:.3}",
                    pad,
                    self.signals.name(id),
                    self.signals.get(id)
                );
            }
            for id in child.outputs.iter() {
                let _ = writeln!(
                    out,
                    "{}  < {} = {:.3}",
                    pad,
                    self.signals.name(id),
                    self.signals.get(id)
                );
            }
            for name in child.module.parameter_names() {
                if let Some(value) = child.module.parameter(name) {
                    let _ = writeln!(out, "{}  {} := {}", pad, name, value);
                }
            }
            if let Some(group) = child.module.as_group() {
                group.describe_scope(out, depth + 1);
            }
        }
        for (port, &slot) in self.outputs.iter().zip(&self.boundary_out) {
            let _ = writeln!(out, "{}< {} = {:.3}", pad, port.name, self.signals.get(slot));
        }
    }
}

impl Module for Group {
    fn ports(&self) -> Ports {
        Ports::new(self.inputs.clone(), self.outputs.clone())
    }

    fn process(&mut self, ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        self.process_frame(ctx, inputs, outputs)
    }

    fn randomize(&mut self, mode: u32) {
        for child in &mut self.children {
            child.module.randomize(mode);
        }
    }

    fn attach(&mut self) {
        self.sealed = true;
    }

    fn as_group(&self) -> Option<&Group> {
        Some(self)
    }

    fn as_group_mut(&mut self) -> Option<&mut Group> {
        Some(self)
    }
}
