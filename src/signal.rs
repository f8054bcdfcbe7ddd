//! Slot storage for one group.
//!
//! Every terminal of every module in a group lives in that group's
//! [`Signals`] arena. Connections are stored as per-slot lists of targets;
//! propagation copies a slot's value into each target in insertion order.

use std::ops::Range;

use crate::module::{Port, Signal};

/// Index of a slot inside a [`Signals`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A contiguous run of slots, as allocated for one module's inputs or outputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRange {
    start: u32,
    len: u32,
}

impl SlotRange {
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> Option<SlotId> {
        (i < self.len()).then(|| SlotId(self.start + i as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = SlotId> {
        (self.start..self.start + self.len).map(SlotId)
    }

    #[inline]
    fn span(&self) -> Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

#[derive(Debug, Default)]
pub struct Signals {
    values: Vec<Signal>,
    names: Vec<String>,
    targets: Vec<Vec<SlotId>>,
    sources: Vec<Option<SlotId>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn alloc(&mut self, port: &Port) -> SlotId {
        let id = SlotId(self.values.len() as u32);
        self.values.push(port.default);
        self.names.push(port.name.to_string());
        self.targets.push(Vec::new());
        self.sources.push(None);
        id
    }

    /// Allocate one slot per port, contiguously.
    pub fn alloc_block(&mut self, ports: &[Port]) -> SlotRange {
        let start = self.values.len() as u32;
        for port in ports {
            self.alloc(port);
        }
        SlotRange {
            start,
            len: ports.len() as u32,
        }
    }

    #[inline]
    pub fn get(&self, id: SlotId) -> Signal {
        self.values[id.index()]
    }

    #[inline]
    pub fn set(&mut self, id: SlotId, value: Signal) {
        self.values[id.index()] = value;
    }

    #[inline]
    pub fn value_mut(&mut self, id: SlotId) -> &mut Signal {
        &mut self.values[id.index()]
    }

    pub fn name(&self, id: SlotId) -> &str {
        &self.names[id.index()]
    }

    pub fn targets(&self, id: SlotId) -> &[SlotId] {
        &self.targets[id.index()]
    }

    /// The slot driving `id`, if any.
    pub fn source(&self, id: SlotId) -> Option<SlotId> {
        self.sources[id.index()]
    }

    /// Append `to` to the targets of `from`.
    ///
    /// A slot has at most one source; on conflict the existing source is
    /// returned and nothing changes.
    pub fn connect(&mut self, from: SlotId, to: SlotId) -> Result<(), SlotId> {
        if let Some(existing) = self.sources[to.index()] {
            return Err(existing);
        }
        self.targets[from.index()].push(to);
        self.sources[to.index()] = Some(from);
        Ok(())
    }

    /// Returns `false` if `from` was not connected to `to`.
    pub fn disconnect(&mut self, from: SlotId, to: SlotId) -> bool {
        let targets = &mut self.targets[from.index()];
        match targets.iter().position(|&t| t == to) {
            Some(pos) => {
                targets.remove(pos);
                self.sources[to.index()] = None;
                true
            }
            None => false,
        }
    }

    /// Copy the value of `id` into each of its targets, in connection order.
    #[inline]
    pub fn propagate(&mut self, id: SlotId) {
        let value = self.values[id.index()];
        for target in &self.targets[id.index()] {
            self.values[target.index()] = value;
        }
    }

    pub fn propagate_range(&mut self, range: SlotRange) {
        for id in range.iter() {
            self.propagate(id);
        }
    }

    pub fn values(&self, range: SlotRange) -> &[Signal] {
        &self.values[range.span()]
    }

    /// Split out a module's input and output slices.
    ///
    /// `outs` must directly follow `ins`, which is how a group allocates them.
    pub fn split_block(&mut self, ins: SlotRange, outs: SlotRange) -> (&[Signal], &mut [Signal]) {
        debug_assert_eq!(ins.start + ins.len, outs.start);
        let block = &mut self.values[ins.start as usize..(outs.start + outs.len) as usize];
        let (inputs, outputs) = block.split_at_mut(ins.len());
        (inputs, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(names: &[&'static str]) -> (Signals, SlotRange) {
        let mut signals = Signals::new();
        let ports: Vec<Port> = names.iter().copied().map(Port::new).collect();
        let range = signals.alloc_block(&ports);
        (signals, range)
    }

    #[test]
    fn propagate_copies_to_every_target() {
        let (mut s, r) = arena(&["a", "b", "c"]);
        let (a, b, c) = (r.get(0).unwrap(), r.get(1).unwrap(), r.get(2).unwrap());
        s.connect(a, b).unwrap();
        s.connect(a, c).unwrap();
        s.set(a, 0.75);
        s.propagate(a);
        assert_eq!(s.get(b), 0.75);
        assert_eq!(s.get(c), 0.75);
        assert_eq!(s.targets(a), [b, c]);
    }

    #[test]
    fn second_source_is_rejected() {
        let (mut s, r) = arena(&["a", "b", "c"]);
        let (a, b, c) = (r.get(0).unwrap(), r.get(1).unwrap(), r.get(2).unwrap());
        s.connect(a, c).unwrap();
        assert_eq!(s.connect(b, c), Err(a));
        assert!(s.targets(b).is_empty());
    }

    #[test]
    fn disconnect_frees_the_destination() {
        let (mut s, r) = arena(&["a", "b", "c"]);
        let (a, b, c) = (r.get(0).unwrap(), r.get(1).unwrap(), r.get(2).unwrap());
        s.connect(a, c).unwrap();
        assert!(s.disconnect(a, c));
        assert!(!s.disconnect(a, c));
        assert_eq!(s.source(c), None);
        s.connect(b, c).unwrap();
        assert_eq!(s.source(c), Some(b));
    }

    #[test]
    fn defaults_and_split() {
        let mut s = Signals::new();
        let ins = s.alloc_block(&[Port::new("x").with_default(2.0)]);
        let outs = s.alloc_block(&[Port::new("y"), Port::new("z")]);
        let (i, o) = s.split_block(ins, outs);
        assert_eq!(i, [2.0]);
        o[1] = 1.0;
        assert_eq!(s.values(outs), [0.0, 1.0]);
        assert_eq!(s.name(outs.get(1).unwrap()), "z");
        assert_eq!(outs.get(2), None);
    }
}
