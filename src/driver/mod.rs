//! Audio drivers.
//!
//! A [`Driver`] owns the hardware (or a stand-in for it) and calls an
//! [`AudioCallback`] once per period with interleaved capture and playback
//! buffers. The engine never touches devices directly.

use std::fmt;
use std::time::Duration;

#[cfg(feature = "cpal_sink")]
mod cpal_driver;
mod headless;

#[cfg(feature = "cpal_sink")]
pub use cpal_driver::CpalDriver;
pub use headless::HeadlessDriver;

/// Called once per period with `(capture, playback)` interleaved sample buffers.
///
/// The playback buffer must be filled completely; it is not cleared beforehand.
pub type AudioCallback = Box<dyn FnMut(&[f32], &mut [f32]) + Send + 'static>;

/// Which device to open for one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    /// Do not open a device for this direction.
    Disabled,
    /// The host's default device.
    #[default]
    Default,
    /// The first device whose name contains this string.
    Named(String),
}

/// Requested stream settings.
///
/// ```
/// use mdlr::driver::{DeviceSelector, DriverConfig};
///
/// let config = DriverConfig::default()
///     .with_sample_rate(48_000)
///     .with_buffer_size(128)
///     .with_capture(DeviceSelector::Default);
/// assert_eq!(config.sample_rate, 48_000);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub sample_rate: u32,
    /// Frames per period.
    pub buffer_size: u32,
    pub capture: DeviceSelector,
    pub playback: DeviceSelector,
    /// Playback channel count; `None` takes the device's preference.
    pub playback_channels: Option<u16>,
    /// How long start/stop may wait for the volume ramp.
    pub ramp_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size: 1024,
            capture: DeviceSelector::Disabled,
            playback: DeviceSelector::Default,
            playback_channels: None,
            ramp_timeout: Duration::from_secs(2),
        }
    }
}

impl DriverConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = frames;
        self
    }

    pub fn with_capture(mut self, selector: DeviceSelector) -> Self {
        self.capture = selector;
        self
    }

    pub fn with_playback(mut self, selector: DeviceSelector) -> Self {
        self.playback = selector;
        self
    }

    pub fn with_playback_channels(mut self, channels: u16) -> Self {
        self.playback_channels = Some(channels);
        self
    }

    pub fn with_ramp_timeout(mut self, timeout: Duration) -> Self {
        self.ramp_timeout = timeout;
        self
    }
}

/// What the driver actually opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub capture_channels: usize,
    pub playback_channels: usize,
}

#[derive(Debug)]
pub enum DriverError {
    /// No device matched the selector.
    NoDevice(String),
    /// The device rejected the requested configuration.
    Config(String),
    StreamBuild(String),
    Playback(String),
    UnsupportedFormat(String),
    /// `start` was called before a successful `configure`.
    NotConfigured,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NoDevice(what) => write!(f, "no audio device: {}", what),
            DriverError::Config(msg) => write!(f, "unsupported stream config: {}", msg),
            DriverError::StreamBuild(msg) => write!(f, "failed to build stream: {}", msg),
            DriverError::Playback(msg) => write!(f, "playback error: {}", msg),
            DriverError::UnsupportedFormat(fmt) => write!(f, "unsupported sample format: {}", fmt),
            DriverError::NotConfigured => f.write_str("driver started before being configured"),
        }
    }
}

impl std::error::Error for DriverError {}

pub trait Driver {
    /// Open devices and settle the stream format.
    fn configure(&mut self, config: &DriverConfig) -> Result<StreamInfo, DriverError>;

    /// Begin calling `callback` from the audio thread.
    fn start(&mut self, callback: AudioCallback) -> Result<(), DriverError>;

    /// Stop the audio thread. Calling it when not running is a no-op.
    fn stop(&mut self) -> Result<(), DriverError>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn configure(&mut self, config: &DriverConfig) -> Result<StreamInfo, DriverError> {
        (**self).configure(config)
    }

    fn start(&mut self, callback: AudioCallback) -> Result<(), DriverError> {
        (**self).start(callback)
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        (**self).stop()
    }
}
