//! Hardware audio through cpal.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SupportedBufferSize, SupportedStreamConfigRange};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{info, warn};

use super::{AudioCallback, DeviceSelector, Driver, DriverConfig, DriverError, StreamInfo};

/// A device as reported by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

struct Endpoint {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: SampleFormat,
}

/// Plays the render callback on a cpal output stream.
///
/// When a capture device is selected, its samples are carried over to the
/// output callback through an `rtrb` ring and handed to the renderer as the
/// capture buffer. Output formats `f32`, `i16` and `u16` are supported.
pub struct CpalDriver {
    host: cpal::Host,
    output: Option<Endpoint>,
    input: Option<Endpoint>,
    streams: Vec<cpal::Stream>,
}

impl Default for CpalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalDriver {
    /// A driver on the platform's default host.
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            output: None,
            input: None,
            streams: Vec::new(),
        }
    }

    /// List all available output devices.
    ///
    /// Returns an empty list if enumeration fails.
    pub fn list_outputs() -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| {
                devices
                    .filter_map(|device| {
                        let config = device.default_output_config().ok()?;
                        Some(DeviceInfo {
                            name: device.name().unwrap_or_else(|_| "Unknown".into()),
                            sample_rate: config.sample_rate().0,
                            channels: config.channels(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn list_inputs() -> Vec<DeviceInfo> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| {
                devices
                    .filter_map(|device| {
                        let config = device.default_input_config().ok()?;
                        Some(DeviceInfo {
                            name: device.name().unwrap_or_else(|_| "Unknown".into()),
                            sample_rate: config.sample_rate().0,
                            channels: config.channels(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn select(&self, selector: &DeviceSelector, output: bool) -> Result<Option<cpal::Device>, DriverError> {
        let direction = if output { "output" } else { "input" };
        let device = match selector {
            DeviceSelector::Disabled => return Ok(None),
            DeviceSelector::Default => {
                if output {
                    self.host.default_output_device()
                } else {
                    self.host.default_input_device()
                }
            }
            DeviceSelector::Named(wanted) => {
                let matches = |d: &cpal::Device| d.name().map_or(false, |n| n.contains(wanted.as_str()));
                let found = if output {
                    self.host.output_devices().map(|mut ds| ds.find(matches))
                } else {
                    self.host.input_devices().map(|mut ds| ds.find(matches))
                };
                found.map_err(|e| DriverError::NoDevice(e.to_string()))?
            }
        };
        device
            .map(Some)
            .ok_or_else(|| DriverError::NoDevice(format!("{} {:?}", direction, selector)))
    }
}

fn format_rank(format: SampleFormat) -> u8 {
    match format {
        SampleFormat::F32 => 3,
        SampleFormat::I16 => 2,
        SampleFormat::U16 => 1,
        _ => 0,
    }
}

fn endpoint(
    device: cpal::Device,
    output: bool,
    config: &DriverConfig,
    channels: Option<u16>,
) -> Result<Endpoint, DriverError> {
    let ranges: Vec<SupportedStreamConfigRange> = if output {
        device
            .supported_output_configs()
            .map_err(|e| DriverError::Config(e.to_string()))?
            .collect()
    } else {
        device
            .supported_input_configs()
            .map_err(|e| DriverError::Config(e.to_string()))?
            .collect()
    };

    let rate = SampleRate(config.sample_rate);
    let best = ranges
        .into_iter()
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter(|r| channels.map_or(true, |c| r.channels() == c))
        .max_by_key(|r| format_rank(r.sample_format()))
        .ok_or_else(|| {
            DriverError::Config(format!(
                "{} Hz with {:?} channels",
                config.sample_rate, channels
            ))
        })?
        .with_sample_rate(rate);

    let buffer_size = match best.buffer_size() {
        SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&config.buffer_size) => {
            BufferSize::Fixed(config.buffer_size)
        }
        _ => BufferSize::Default,
    };
    let format = best.sample_format();
    let mut stream_config = best.config();
    stream_config.buffer_size = buffer_size;

    info!(
        device = %device.name().unwrap_or_else(|_| "Unknown".into()),
        ?stream_config,
        ?format,
        output,
        "configured endpoint"
    );
    Ok(Endpoint {
        device,
        config: stream_config,
        format,
    })
}

fn stream_error(err: cpal::StreamError) {
    warn!(%err, "audio stream error");
}

/// State moved into the output stream callback.
struct Render {
    callback: AudioCallback,
    capture: Option<Consumer<f32>>,
    capture_channels: usize,
    playback_channels: usize,
    capture_buf: Vec<f32>,
    playback_buf: Vec<f32>,
}

impl Render {
    fn fill<T>(&mut self, data: &mut [T], convert: impl Fn(f32) -> T) {
        let frames = data.len() / self.playback_channels.max(1);
        // only allocates if the host hands us a larger period than before
        self.playback_buf.resize(data.len(), 0.0);
        self.capture_buf.resize(frames * self.capture_channels, 0.0);
        if let Some(capture) = self.capture.as_mut() {
            for sample in self.capture_buf.iter_mut() {
                *sample = capture.pop().unwrap_or(0.0);
            }
        }
        (self.callback)(&self.capture_buf, &mut self.playback_buf);
        for (out, &sample) in data.iter_mut().zip(&self.playback_buf) {
            *out = convert(sample);
        }
    }
}

fn build_output(endpoint: &Endpoint, mut render: Render) -> Result<cpal::Stream, DriverError> {
    let device = &endpoint.device;
    let config = &endpoint.config;
    let stream = match endpoint.format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render.fill(data, |s| s),
            stream_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                render.fill(data, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            },
            stream_error,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            config,
            move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                render.fill(data, |s| ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16)
            },
            stream_error,
            None,
        ),
        other => return Err(DriverError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.map_err(|e| DriverError::StreamBuild(e.to_string()))
}

fn build_input(endpoint: &Endpoint, mut ring: Producer<f32>) -> Result<cpal::Stream, DriverError> {
    let device = &endpoint.device;
    let config = &endpoint.config;
    // a full ring drops the newest samples; the output side reads zeros on underrun
    let stream = match endpoint.format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for &s in data {
                    let _ = ring.push(s);
                }
            },
            stream_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                for &s in data {
                    let _ = ring.push(s as f32 / i16::MAX as f32);
                }
            },
            stream_error,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                for &s in data {
                    let _ = ring.push(s as f32 / u16::MAX as f32 * 2.0 - 1.0);
                }
            },
            stream_error,
            None,
        ),
        other => return Err(DriverError::UnsupportedFormat(format!("{:?}", other))),
    };
    stream.map_err(|e| DriverError::StreamBuild(e.to_string()))
}

fn play(stream: cpal::Stream) -> Result<cpal::Stream, DriverError> {
    stream.play().map_err(|e| DriverError::Playback(e.to_string()))?;
    Ok(stream)
}

/// Keep a stream that started, or drop every stream started so far.
fn keep_started<S>(streams: &mut Vec<S>, started: Result<S, DriverError>) -> Result<(), DriverError> {
    match started {
        Ok(stream) => {
            streams.push(stream);
            Ok(())
        }
        Err(err) => {
            if !streams.is_empty() {
                warn!(%err, dropped = streams.len(), "releasing streams after failed start");
            }
            streams.clear();
            Err(err)
        }
    }
}

impl Driver for CpalDriver {
    fn configure(&mut self, config: &DriverConfig) -> Result<StreamInfo, DriverError> {
        let output = self
            .select(&config.playback, true)?
            .ok_or_else(|| DriverError::Config("a playback device is required".into()))?;
        let output = endpoint(output, true, config, config.playback_channels)?;
        let input = match self.select(&config.capture, false)? {
            Some(device) => Some(endpoint(device, false, config, None)?),
            None => None,
        };

        let info = StreamInfo {
            sample_rate: config.sample_rate,
            buffer_size: config.buffer_size,
            capture_channels: input.as_ref().map_or(0, |e| e.config.channels as usize),
            playback_channels: output.config.channels as usize,
        };
        self.output = Some(output);
        self.input = input;
        Ok(info)
    }

    fn start(&mut self, callback: AudioCallback) -> Result<(), DriverError> {
        let output = self.output.as_ref().ok_or(DriverError::NotConfigured)?;
        if !self.streams.is_empty() {
            return Err(DriverError::Playback("already running".into()));
        }
        let playback_channels = output.config.channels as usize;

        let mut capture = None;
        let mut capture_channels = 0;
        if let Some(input) = &self.input {
            capture_channels = input.config.channels as usize;
            let frames = match input.config.buffer_size {
                BufferSize::Fixed(frames) => frames as usize,
                BufferSize::Default => 1024,
            };
            let (producer, consumer) = RingBuffer::new((frames * capture_channels * 4).next_power_of_two());
            keep_started(&mut self.streams, build_input(input, producer).and_then(play))?;
            capture = Some(consumer);
        }

        let render = Render {
            callback,
            capture,
            capture_channels,
            playback_channels,
            capture_buf: Vec::new(),
            playback_buf: Vec::new(),
        };
        keep_started(&mut self.streams, build_output(output, render).and_then(play))?;
        info!(playback_channels, capture_channels, "cpal streams started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        for stream in &self.streams {
            if let Err(err) = stream.pause() {
                warn!(%err, "failed to pause stream");
            }
        }
        if !self.streams.is_empty() {
            info!("cpal streams stopped");
        }
        self.streams.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_start_releases_earlier_streams() {
        let mut streams = vec!["capture"];
        let err = keep_started(&mut streams, Err(DriverError::StreamBuild("busy".into())));
        assert!(matches!(err, Err(DriverError::StreamBuild(_))));
        assert!(streams.is_empty());

        keep_started(&mut streams, Ok("capture")).unwrap();
        keep_started(&mut streams, Ok("playback")).unwrap();
        assert_eq!(streams, ["capture", "playback"]);
    }

    #[test]
    fn start_before_configure() {
        let mut driver = CpalDriver::new();
        let started = driver.start(Box::new(|_, _| {}));
        assert!(matches!(started, Err(DriverError::NotConfigured)));
        assert!(driver.streams.is_empty());
    }
}
