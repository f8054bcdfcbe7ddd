//! Built-in modules.

pub mod attenuator;
pub mod clock;
pub mod delay;
pub mod envelope;
pub mod filter;
pub mod midi;
pub mod mixer;
pub mod oscillator;
pub mod sequencer;
pub mod sigmoid;

pub use attenuator::Attenuator;
pub use clock::ClockDivider;
pub use delay::Delay;
pub use envelope::{Adsr, Envelope, Stage};
pub use filter::KellettFilter;
pub use midi::{MidiCc, MidiEvent, MidiGate, MidiIn, MidiSender};
pub use mixer::Mixer;
pub use oscillator::Oscillator;
pub use sequencer::{GateMode, Metropolis, Sequencer, Step};
pub use sigmoid::Sigmoid;
