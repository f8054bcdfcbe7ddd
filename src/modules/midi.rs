//! MIDI-driven modules.
//!
//! Device binding and byte decoding happen elsewhere; these modules receive
//! already decoded [`MidiEvent`]s through a lock-free queue and turn them
//! into signals at the start of each frame.

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::trace;

use crate::module::{Module, Port, Ports, ProcessContext, Signal};
use crate::param::{ParamError, ParamTable, Parameter, Value, ValueError};

/// Default capacity of a module's event queue.
pub const QUEUE_SIZE: usize = 256;

/// A decoded MIDI message. Channels are 0-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Channel pressure.
    Aftertouch { channel: u8, pressure: u8 },
    /// Bend amount in `-8192..=8191`.
    PitchBend { channel: u8, value: i16 },
    Clock,
    Start,
    Continue,
    Stop,
}

impl MidiEvent {
    /// Note-on with velocity 0 is a note-off.
    fn normalized(self) -> Self {
        match self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity: 0,
            } => MidiEvent::NoteOff { channel, note },
            other => other,
        }
    }

    fn channel(&self) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::Aftertouch { channel, .. }
            | MidiEvent::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

/// Sending half of a MIDI module's event queue.
pub struct MidiSender {
    producer: Producer<MidiEvent>,
}

impl MidiSender {
    /// Queue an event for the module's next frame.
    ///
    /// Returns `Err(event)` if the queue is full.
    pub fn send(&mut self, event: MidiEvent) -> Result<(), MidiEvent> {
        self.producer
            .push(event)
            .map_err(|rtrb::PushError::Full(e)| e)
    }
}

fn queue() -> (MidiSender, Consumer<MidiEvent>) {
    let (producer, consumer) = RingBuffer::new(QUEUE_SIZE);
    (MidiSender { producer }, consumer)
}

/// Channel filter shared by the MIDI modules: `None` listens to every channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct ChannelFilter(Option<u8>);

impl ChannelFilter {
    fn accepts(&self, event: &MidiEvent) -> bool {
        match (self.0, event.channel()) {
            (Some(wanted), Some(channel)) => wanted == channel,
            _ => true,
        }
    }

    fn value(&self) -> Value {
        Value::Int(self.0.map_or(-1, i64::from))
    }

    fn set(&mut self, value: Value) -> Result<(), ValueError> {
        let channel = i64::try_from(value)?;
        self.0 = match channel {
            -1 => None,
            0..=15 => Some(channel as u8),
            _ => return Err(ValueError::Range(format!("channel {} not in -1..=15", channel))),
        };
        Ok(())
    }
}

#[inline]
pub fn note_to_hz(note: u8) -> f32 {
    440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
}

mod out {
    pub const PITCH: usize = 0;
    pub const GATE: usize = 1;
    pub const VELOCITY: usize = 2;
    pub const AFTERTOUCH: usize = 3;
    pub const PITCHBEND: usize = 4;
    pub const MODULATION: usize = 5;
    pub const CLOCK: usize = 6;
}

#[derive(Clone, Copy, Debug, Default)]
struct Transport {
    clock: bool,
    start: bool,
    cont: bool,
    stop: bool,
}

/// Monophonic MIDI-to-signal converter.
///
/// Outputs `pitch` (Hz), `gate`, `velocity`, `aftertouch`, `pitchbend`
/// (-1..1), `modulation` (CC 1), and one-frame pulses `clock`, `start`,
/// `continue` and `stop` for realtime messages. The gate closes only when
/// the most recently played note is released.
pub struct MidiIn {
    events: Consumer<MidiEvent>,
    filter: ChannelFilter,
    last_note: Option<u8>,
    transport: Transport,
    levels: [Signal; 6],
}

static MIDI_IN_PARAMS: ParamTable<MidiIn> = ParamTable::new(&[Parameter {
    name: "channel",
    get: |m| m.filter.value(),
    set: |m, v| m.filter.set(v),
}]);

impl MidiIn {
    pub fn new() -> (Self, MidiSender) {
        let (sender, events) = queue();
        let module = Self {
            events,
            filter: ChannelFilter::default(),
            last_note: None,
            transport: Transport::default(),
            levels: [0.0; 6],
        };
        (module, sender)
    }

    fn handle(&mut self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn { note, velocity, .. } => {
                self.last_note = Some(note);
                self.levels[out::PITCH] = note_to_hz(note);
                self.levels[out::VELOCITY] = velocity as f32 / 127.0;
                self.levels[out::GATE] = 1.0;
            }
            MidiEvent::NoteOff { note, .. } => {
                if self.last_note == Some(note) {
                    self.levels[out::GATE] = 0.0;
                }
            }
            MidiEvent::ControlChange {
                controller: 1,
                value,
                ..
            } => self.levels[out::MODULATION] = value as f32 / 127.0,
            MidiEvent::ControlChange { .. } => {}
            MidiEvent::Aftertouch { pressure, .. } => {
                self.levels[out::AFTERTOUCH] = pressure as f32 / 127.0
            }
            MidiEvent::PitchBend { value, .. } => {
                self.levels[out::PITCHBEND] = (value as f32 / 8192.0).clamp(-1.0, 1.0)
            }
            MidiEvent::Clock => self.transport.clock = true,
            MidiEvent::Start => self.transport.start = true,
            MidiEvent::Continue => self.transport.cont = true,
            MidiEvent::Stop => self.transport.stop = true,
        }
    }
}

impl Module for MidiIn {
    fn ports(&self) -> Ports {
        Ports::named(
            &[],
            &[
                "pitch",
                "gate",
                "velocity",
                "aftertouch",
                "pitchbend",
                "modulation",
                "clock",
                "start",
                "continue",
                "stop",
            ],
        )
    }

    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Signal], outputs: &mut [Signal]) {
        while let Ok(event) = self.events.pop() {
            let event = event.normalized();
            if self.filter.accepts(&event) {
                trace!(?event, "midi in");
                self.handle(event);
            }
        }

        outputs[..out::CLOCK].copy_from_slice(&self.levels);
        let transport = std::mem::take(&mut self.transport);
        let pulses = [transport.clock, transport.start, transport.cont, transport.stop];
        for (output, pulse) in outputs[out::CLOCK..].iter_mut().zip(pulses) {
            *output = if pulse { 1.0 } else { 0.0 };
        }
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        MIDI_IN_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        MIDI_IN_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        MIDI_IN_PARAMS.set(self, name, value)
    }
}

/// 128 control-change levels: output `cc-N` holds the last value of
/// controller `N`, scaled to `0..1`.
pub struct MidiCc {
    events: Consumer<MidiEvent>,
    filter: ChannelFilter,
    values: [Signal; 128],
}

static MIDI_CC_PARAMS: ParamTable<MidiCc> = ParamTable::new(&[Parameter {
    name: "channel",
    get: |m| m.filter.value(),
    set: |m, v| m.filter.set(v),
}]);

impl MidiCc {
    pub fn new() -> (Self, MidiSender) {
        let (sender, events) = queue();
        let module = Self {
            events,
            filter: ChannelFilter::default(),
            values: [0.0; 128],
        };
        (module, sender)
    }
}

impl Module for MidiCc {
    fn ports(&self) -> Ports {
        Ports::new(Vec::new(), Port::numbered("cc", 128))
    }

    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Signal], outputs: &mut [Signal]) {
        while let Ok(event) = self.events.pop() {
            if let MidiEvent::ControlChange {
                controller, value, ..
            } = event
            {
                if self.filter.accepts(&event) {
                    if let Some(slot) = self.values.get_mut(controller as usize) {
                        *slot = value as f32 / 127.0;
                    }
                }
            }
        }
        outputs.copy_from_slice(&self.values);
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        MIDI_CC_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        MIDI_CC_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        MIDI_CC_PARAMS.set(self, name, value)
    }
}

/// 128 note gates: output `note-N` is 1 while note `N` is held.
pub struct MidiGate {
    events: Consumer<MidiEvent>,
    filter: ChannelFilter,
    gates: [Signal; 128],
}

static MIDI_GATE_PARAMS: ParamTable<MidiGate> = ParamTable::new(&[Parameter {
    name: "channel",
    get: |m| m.filter.value(),
    set: |m, v| m.filter.set(v),
}]);

impl MidiGate {
    pub fn new() -> (Self, MidiSender) {
        let (sender, events) = queue();
        let module = Self {
            events,
            filter: ChannelFilter::default(),
            gates: [0.0; 128],
        };
        (module, sender)
    }
}

impl Module for MidiGate {
    fn ports(&self) -> Ports {
        Ports::new(Vec::new(), Port::numbered("note", 128))
    }

    fn process(&mut self, _ctx: &ProcessContext, _inputs: &[Signal], outputs: &mut [Signal]) {
        while let Ok(event) = self.events.pop() {
            let event = event.normalized();
            if !self.filter.accepts(&event) {
                continue;
            }
            let (note, level) = match event {
                MidiEvent::NoteOn { note, .. } => (note, 1.0),
                MidiEvent::NoteOff { note, .. } => (note, 0.0),
                _ => continue,
            };
            if let Some(gate) = self.gates.get_mut(note as usize) {
                *gate = level;
            }
        }
        outputs.copy_from_slice(&self.gates);
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        MIDI_GATE_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        MIDI_GATE_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        MIDI_GATE_PARAMS.set(self, name, value)
    }
}
