//! Textual control commands and the queue that carries them to the renderer.
//!
//! Two forms are understood:
//!
//! - `path = value` writes an input terminal (when the value is numeric) and/or
//!   a parameter at `path`,
//! - `path.randomize()` or `path.randomize(mode)` re-rolls a module's state.

use std::fmt;

use rtrb::{Consumer, Producer, RingBuffer};
use tracing::debug;

use crate::group::{Group, PatchError};
use crate::param::Value;

/// Default capacity of the control queue.
pub const QUEUE_SIZE: usize = 1024;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Set { path: String, value: Value },
    Randomize { path: String, mode: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: String,
    pub reason: &'static str,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot parse '{}': {}", self.line, self.reason)
    }
}

impl std::error::Error for ParseError {}

impl Command {
    /// Parse one line of the control language.
    ///
    /// ```
    /// use mdlr::control::Command;
    /// use mdlr::Value;
    ///
    /// assert_eq!(
    ///     Command::parse("acid.seq.gatelen = 0.05").unwrap(),
    ///     Command::Set { path: "acid.seq.gatelen".into(), value: Value::Float(0.05) },
    /// );
    /// assert_eq!(
    ///     Command::parse("acid.seq.randomize(1)").unwrap(),
    ///     Command::Randomize { path: "acid.seq".into(), mode: 1 },
    /// );
    /// ```
    pub fn parse(line: &str) -> Result<Command, ParseError> {
        let error = |reason| ParseError {
            line: line.to_string(),
            reason,
        };
        let text = line.trim();
        if text.is_empty() {
            return Err(error("empty command"));
        }

        if let Some((path, value)) = text.split_once('=') {
            let path = path.trim();
            if path.is_empty() {
                return Err(error("missing path"));
            }
            return Ok(Command::Set {
                path: path.to_string(),
                value: Value::parse(value),
            });
        }

        let call = text
            .strip_suffix(')')
            .ok_or_else(|| error("expected 'path = value' or 'path.randomize()'"))?;
        let (target, args) = call
            .split_once('(')
            .ok_or_else(|| error("unbalanced parentheses"))?;
        let path = match target.rsplit_once('.') {
            Some((path, "randomize")) => path,
            None if target == "randomize" => "",
            _ => return Err(error("unknown function")),
        };
        let args = args.trim();
        let mode = if args.is_empty() {
            0
        } else {
            args.parse::<u32>().map_err(|_| error("mode must be a non-negative integer"))?
        };
        Ok(Command::Randomize {
            path: path.trim().to_string(),
            mode,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            Command::Set { path, .. } | Command::Randomize { path, .. } => path,
        }
    }
}

impl Group {
    /// Apply a control command to this group's tree.
    ///
    /// A `Set` whose path names both an input and a parameter writes both.
    /// It fails only when the path names neither.
    pub fn apply(&mut self, command: Command) -> Result<(), PatchError> {
        match command {
            Command::Set { path, value } => {
                let mut applied = false;
                if let Some(level) = value.as_signal() {
                    if let Some(slot) = self.find_input_mut(&path) {
                        *slot = level;
                        debug!(%path, level, "set input");
                        applied = true;
                    }
                }
                match self.write_parameter(&path, value) {
                    Ok(()) => {
                        debug!(%path, "set parameter");
                        applied = true;
                    }
                    Err(PatchError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
                if applied {
                    Ok(())
                } else {
                    Err(PatchError::NotFound(path))
                }
            }
            Command::Randomize { path, mode } => {
                self.randomize_at(&path, mode)?;
                debug!(%path, mode, "randomized");
                Ok(())
            }
        }
    }
}

/// Why [`Controller::submit`] did not queue a line.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitError {
    Parse(ParseError),
    /// The queue is full; the parsed command is handed back.
    Full(Command),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Parse(e) => e.fmt(f),
            SubmitError::Full(cmd) => write!(f, "control queue full, dropped command for '{}'", cmd.path()),
        }
    }
}

impl std::error::Error for SubmitError {}

/// The sending half of the control queue.
///
/// Commands are applied by the render thread at the start of the next frame.
pub struct Controller {
    sender: Producer<Command>,
}

impl Controller {
    /// Queue a command.
    ///
    /// Returns `Err(command)` if the queue is full.
    pub fn send(&mut self, command: Command) -> Result<(), Command> {
        self.sender
            .push(command)
            .map_err(|rtrb::PushError::Full(c)| c)
    }

    /// Parse a line and queue the resulting command.
    pub fn submit(&mut self, line: &str) -> Result<(), SubmitError> {
        let command = Command::parse(line).map_err(SubmitError::Parse)?;
        self.send(command).map_err(SubmitError::Full)
    }

    /// Free slots left in the queue.
    pub fn capacity(&self) -> usize {
        self.sender.slots()
    }
}

pub(crate) fn channel(capacity: usize) -> (Controller, Consumer<Command>) {
    let (sender, receiver) = RingBuffer::new(capacity);
    (Controller { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{Envelope, Metropolis};

    #[test]
    fn parse_set() {
        assert_eq!(
            Command::parse(" env.a = 0.5 ").unwrap(),
            Command::Set {
                path: "env.a".into(),
                value: Value::Float(0.5)
            }
        );
        assert_eq!(
            Command::parse("x=true").unwrap(),
            Command::Set {
                path: "x".into(),
                value: Value::Bool(true)
            }
        );
    }

    #[test]
    fn parse_randomize() {
        assert_eq!(
            Command::parse("a.b.randomize()").unwrap(),
            Command::Randomize {
                path: "a.b".into(),
                mode: 0
            }
        );
        assert_eq!(
            Command::parse("randomize(3)").unwrap(),
            Command::Randomize {
                path: "".into(),
                mode: 3
            }
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("= 3").is_err());
        assert!(Command::parse("seq.explode()").is_err());
        assert!(Command::parse("seq.randomize(-1)").is_err());
        assert!(Command::parse("just words").is_err());
    }

    #[test]
    fn apply_writes_inputs_and_parameters() {
        let mut g = Group::new();
        g.add("env", Envelope::new()).unwrap();
        g.add("seq", Metropolis::with_seed(1)).unwrap();

        g.apply(Command::parse("env.a = 0.3").unwrap()).unwrap();
        assert_eq!(g.find_input("env.a"), Some(0.3));

        g.apply(Command::parse("seq.gatelen = 0.02").unwrap()).unwrap();
        assert_eq!(g.find_parameter("seq.gatelen"), Some(Value::Float(0.02)));

        assert_eq!(
            g.apply(Command::parse("env.nothing = 1").unwrap()),
            Err(PatchError::NotFound("env.nothing".into()))
        );
        assert!(matches!(
            g.apply(Command::parse("seq.gatelen = fast").unwrap()),
            Err(PatchError::Parameter { .. })
        ));
        g.apply(Command::parse("seq.randomize(2)").unwrap()).unwrap();
    }

    #[test]
    fn boolean_drives_a_gate_input() {
        let mut g = Group::new();
        g.add("env", Envelope::new()).unwrap();
        g.apply(Command::parse("env.gate = true").unwrap()).unwrap();
        assert_eq!(g.find_input("env.gate"), Some(1.0));
        g.apply(Command::parse("env.gate = false").unwrap()).unwrap();
        assert_eq!(g.find_input("env.gate"), Some(0.0));
    }

    #[test]
    fn controller_hands_back_on_full_queue() {
        let (mut controller, mut receiver) = channel(1);
        controller.submit("a = 1").unwrap();
        assert!(matches!(controller.submit("b = 2"), Err(SubmitError::Full(_))));
        assert!(matches!(controller.submit("??"), Err(SubmitError::Parse(_))));
        assert_eq!(receiver.pop().unwrap().path(), "a");
        assert_eq!(controller.capacity(), 1);
    }
}
