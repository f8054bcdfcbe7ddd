//! Drives a root [`Group`] from a [`Driver`]'s audio callback.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtrb::Consumer;
use tracing::{info, warn};

use crate::control::{self, Command, Controller};
use crate::driver::{Driver, DriverConfig, DriverError, StreamInfo};
use crate::group::Group;
use crate::module::{Module, ProcessContext, Signal};

/// How close the volume must get to its target before start/stop return.
const SETTLED: f32 = 0.01;

/// Ramp speed in Hz; the per-frame smoothing factor is `RAMP_RATE / sample_rate`.
const RAMP_RATE: f32 = 70.0;

/// Output volume shared between the control thread and the renderer.
///
/// Both values are `f32` stored as bits in atomics.
#[derive(Debug)]
pub struct VolumeRamp {
    target: AtomicU32,
    current: AtomicU32,
}

impl Default for VolumeRamp {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeRamp {
    /// Silent, with a silent target.
    pub fn new() -> Self {
        Self {
            target: AtomicU32::new(0f32.to_bits()),
            current: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn target(&self) -> f32 {
        f32::from_bits(self.target.load(Ordering::Acquire))
    }

    pub fn set_target(&self, target: f32) {
        self.target.store(target.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }

    pub fn current(&self) -> f32 {
        f32::from_bits(self.current.load(Ordering::Acquire))
    }

    fn store_current(&self, current: f32) {
        self.current.store(current.to_bits(), Ordering::Release);
    }

    pub fn settled(&self) -> bool {
        (self.target() - self.current()).abs() <= SETTLED
    }
}

/// The render side of an [`Engine`]: owns the root group and turns
/// interleaved device buffers into frames.
pub struct Renderer {
    system: Group,
    ctx: ProcessContext,
    commands: Consumer<Command>,
    volume: Arc<VolumeRamp>,
    smoothing: f32,
    buffer_size: usize,
    capture_channels: usize,
    playback_channels: usize,
    inputs: Vec<Signal>,
    outputs: Vec<Signal>,
}

impl Renderer {
    /// Seal `system` and pair the renderer with the controller feeding it.
    pub fn new(mut system: Group, info: StreamInfo, volume: Arc<VolumeRamp>) -> (Self, Controller) {
        system.attach();
        let (controller, commands) = control::channel(control::QUEUE_SIZE);
        let sample_rate = info.sample_rate.max(1) as f32;
        let renderer = Self {
            inputs: vec![0.0; system.input_count().min(info.capture_channels)],
            outputs: vec![0.0; system.output_count()],
            system,
            ctx: ProcessContext::new(sample_rate),
            commands,
            volume,
            smoothing: (RAMP_RATE / sample_rate).min(1.0),
            buffer_size: info.buffer_size as usize,
            capture_channels: info.capture_channels,
            playback_channels: info.playback_channels,
        };
        (renderer, controller)
    }

    pub fn system(&self) -> &Group {
        &self.system
    }

    pub fn system_mut(&mut self) -> &mut Group {
        &mut self.system
    }

    /// Current output volume.
    pub fn volume(&self) -> f32 {
        self.volume.current()
    }

    fn frames(&self, capture: &[f32], playback: &[f32]) -> usize {
        if self.playback_channels > 0 {
            playback.len() / self.playback_channels
        } else if self.capture_channels > 0 {
            capture.len() / self.capture_channels
        } else {
            self.buffer_size
        }
    }

    /// Render one period of interleaved audio.
    pub fn render(&mut self, capture: &[f32], playback: &mut [f32]) {
        let frames = self.frames(capture, playback);
        let target = self.volume.target();
        let mut current = self.volume.current();

        for frame in 0..frames {
            while let Ok(command) = self.commands.pop() {
                if let Err(err) = self.system.apply(command) {
                    warn!(%err, "control command rejected");
                }
            }

            let captured = capture.get(frame * self.capture_channels..);
            for (c, input) in self.inputs.iter_mut().enumerate() {
                *input = captured.and_then(|s| s.get(c)).copied().unwrap_or(0.0);
            }

            self.system.process_frame(&self.ctx, &self.inputs, &mut self.outputs);

            let start = frame * self.playback_channels;
            if let Some(out) = playback.get_mut(start..start + self.playback_channels) {
                for (c, sample) in out.iter_mut().enumerate() {
                    *sample = self.outputs.get(c).map_or(0.0, |&v| v * current);
                }
            }

            current = current * (1.0 - self.smoothing) + target * self.smoothing;
        }

        self.volume.store_current(current);
    }
}

#[derive(Debug)]
pub enum EngineError {
    Driver(DriverError),
    /// `start` while already running.
    Running,
    /// `stop` while not running.
    NotRunning,
    /// The engine already ran once; the root group went with the renderer.
    Finished,
    /// The volume did not settle within the configured timeout.
    RampTimeout { target: f32, current: f32 },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Driver(e) => write!(f, "driver error: {}", e),
            EngineError::Running => f.write_str("engine is already running"),
            EngineError::NotRunning => f.write_str("engine is not running"),
            EngineError::Finished => f.write_str("engine has already run"),
            EngineError::RampTimeout { target, current } => write!(
                f,
                "volume ramp timed out at {:.3} (target {:.3})",
                current, target
            ),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DriverError> for EngineError {
    fn from(e: DriverError) -> Self {
        EngineError::Driver(e)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    Finished,
}

/// A configured driver plus the system it will play.
///
/// Build the patch through [`system_mut`](Engine::system_mut), then
/// [`start`](Engine::start). After that the only way to reach the graph is
/// the [`Controller`].
///
/// ```
/// use mdlr::driver::{DriverConfig, HeadlessDriver};
/// use mdlr::modules::Oscillator;
/// use mdlr::Engine;
///
/// let mut engine = Engine::new(HeadlessDriver::new(0, 1), &DriverConfig::default())?;
/// let system = engine.system_mut().unwrap();
/// system.add("osc", Oscillator::new())?;
/// system.connect("osc.output", "out-0")?;
///
/// engine.start()?;
/// engine.controller().unwrap().submit("osc.frequency = 220").unwrap();
/// engine.stop()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Engine<D: Driver> {
    driver: D,
    info: StreamInfo,
    ramp_timeout: Duration,
    volume: Arc<VolumeRamp>,
    system: Option<Group>,
    controller: Option<Controller>,
    state: State,
}

impl<D: Driver> Engine<D> {
    /// Configure `driver` and create a root group with one input per capture
    /// channel and one output per playback channel.
    pub fn new(mut driver: D, config: &DriverConfig) -> Result<Self, EngineError> {
        let info = driver.configure(config)?;
        Ok(Self {
            driver,
            info,
            ramp_timeout: config.ramp_timeout,
            volume: Arc::new(VolumeRamp::new()),
            system: Some(Group::with_io(info.capture_channels, info.playback_channels)),
            controller: None,
            state: State::Idle,
        })
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// The root group, until the engine starts.
    pub fn system_mut(&mut self) -> Option<&mut Group> {
        self.system.as_mut()
    }

    /// The control queue into the running system.
    pub fn controller(&mut self) -> Option<&mut Controller> {
        self.controller.as_mut()
    }

    /// Move the controller out, e.g. to hand it to another thread.
    pub fn take_controller(&mut self) -> Option<Controller> {
        self.controller.take()
    }

    pub fn volume(&self) -> f32 {
        self.volume.current()
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Start rendering and block until the output has faded in.
    ///
    /// The root group moves into the driver's callback, so a driver that
    /// fails to start takes it down with it and the engine is finished.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            State::Running => return Err(EngineError::Running),
            State::Finished => return Err(EngineError::Finished),
            State::Idle => {}
        }
        let system = self.system.take().ok_or(EngineError::Finished)?;
        let (mut renderer, controller) = Renderer::new(system, self.info, Arc::clone(&self.volume));
        let started = self
            .driver
            .start(Box::new(move |capture, playback| renderer.render(capture, playback)));
        if let Err(err) = started {
            warn!(%err, "driver failed to start");
            self.state = State::Finished;
            return Err(err.into());
        }
        self.controller = Some(controller);
        self.state = State::Running;
        info!(info = ?self.info, "engine started");

        self.volume.set_target(1.0);
        self.wait_for_ramp()
    }

    /// Fade out, then stop the driver. An engine cannot be restarted.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        if self.state != State::Running {
            return Err(EngineError::NotRunning);
        }
        self.volume.set_target(0.0);
        let ramp = self.wait_for_ramp();
        self.state = State::Finished;
        self.controller = None;
        self.driver.stop()?;
        info!("engine stopped");
        ramp
    }

    fn wait_for_ramp(&self) -> Result<(), EngineError> {
        let deadline = Instant::now() + self.ramp_timeout;
        while !self.volume.settled() {
            if Instant::now() >= deadline {
                return Err(EngineError::RampTimeout {
                    target: self.volume.target(),
                    current: self.volume.current(),
                });
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }
}

impl<D: Driver> Drop for Engine<D> {
    fn drop(&mut self) {
        if self.state == State::Running {
            if let Err(err) = self.driver.stop() {
                warn!(%err, "failed to stop driver on drop");
            }
        }
    }
}
