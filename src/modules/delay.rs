use crate::module::{Module, Ports, ProcessContext, Signal};
use crate::param::{ParamError, ParamTable, Parameter, Value, ValueError};

/// Largest accepted `buffersize`, in samples.
pub const MAX_BUFFER: usize = 1 << 20;

const DEFAULT_BUFFER: usize = 1024 * 128;

/// Smoothed feedback-free delay line.
///
/// Input `time` is a fraction of the buffer length (0..1). At 0 the input
/// passes through with no latency; at 1 it comes back `buffersize - 1`
/// samples later. Both the delay time and the output are low-pass smoothed,
/// so sweeping `time` glides instead of clicking.
///
/// Parameter `buffersize` sets the buffer length in samples, clamped to
/// `[1, 2^20]`.
pub struct Delay {
    buffer: Vec<f32>,
    buffer_size: usize,
    write: usize,
    time: f32,
    value: f32,
}

static DELAY_PARAMS: ParamTable<Delay> = ParamTable::new(&[Parameter {
    name: "buffersize",
    get: |d| Value::Int(d.buffer_size as i64),
    set: |d, v| {
        let size = usize::try_from(v)?;
        if size == 0 {
            return Err(ValueError::Range("buffer size must be positive".into()));
        }
        d.buffer_size = size.min(MAX_BUFFER);
        Ok(())
    },
}]);

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Delay {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER)
    }

    pub fn with_buffer_size(size: usize) -> Self {
        let size = size.clamp(1, MAX_BUFFER);
        Self {
            buffer: vec![0.0; size],
            buffer_size: size,
            write: 0,
            time: 0.0,
            value: 0.0,
        }
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

impl Module for Delay {
    fn ports(&self) -> Ports {
        Ports::named(&["input", "time"], &["output"])
    }

    fn process(&mut self, _ctx: &ProcessContext, inputs: &[Signal], outputs: &mut [Signal]) {
        // a parameter write only records the size; the buffer follows here
        if self.buffer.len() != self.buffer_size {
            self.buffer.resize(self.buffer_size, 0.0);
            self.write %= self.buffer_size;
        }
        let len = self.buffer.len();

        let target = inputs[1].clamp(0.0, 1.0) * (len - 1) as f32;
        self.time = self.time * 0.99 + target * 0.01;

        let written = self.write;
        self.buffer[written] = inputs[0];
        self.write = (written + 1) % len;
        let lag = self.time.round() as i64;
        let read = (written as i64 - lag).rem_euclid(len as i64) as usize;
        self.value = self.value * 0.9 + self.buffer[read] * 0.1;
        outputs[0] = self.value.clamp(-1.0, 1.0);
    }

    fn parameter_names(&self) -> Vec<&'static str> {
        DELAY_PARAMS.names()
    }

    fn parameter(&self, name: &str) -> Option<Value> {
        DELAY_PARAMS.get(self, name)
    }

    fn set_parameter(&mut self, name: &str, value: Value) -> Result<(), ParamError> {
        DELAY_PARAMS.set(self, name, value)
    }
}
