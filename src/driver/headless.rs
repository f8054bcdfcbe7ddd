use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rtrb::Producer;
use tracing::{info, warn};

use super::{AudioCallback, DeviceSelector, Driver, DriverConfig, DriverError, StreamInfo};

/// A driver without hardware: a worker thread calls the render callback on
/// a software clock.
///
/// Capture buffers are silent. Rendered samples can be observed through an
/// optional `rtrb` tap, which drops samples when nobody reads them.
///
/// ```
/// use mdlr::driver::{Driver, DriverConfig, HeadlessDriver};
///
/// let mut driver = HeadlessDriver::new(0, 2);
/// let info = driver.configure(&DriverConfig::default()).unwrap();
/// assert_eq!(info.playback_channels, 2);
/// ```
pub struct HeadlessDriver {
    capture_channels: usize,
    playback_channels: usize,
    paced: bool,
    tap: Option<Producer<f32>>,
    info: Option<StreamInfo>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl HeadlessDriver {
    pub fn new(capture_channels: usize, playback_channels: usize) -> Self {
        Self {
            capture_channels,
            playback_channels,
            paced: true,
            tap: None,
            info: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Forward every rendered playback sample into `tap`.
    pub fn with_tap(mut self, tap: Producer<f32>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Render as fast as possible instead of in real time.
    pub fn free_running(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Driver for HeadlessDriver {
    fn configure(&mut self, config: &DriverConfig) -> Result<StreamInfo, DriverError> {
        if config.sample_rate == 0 || config.buffer_size == 0 {
            return Err(DriverError::Config(format!(
                "{} Hz with {} frames per period",
                config.sample_rate, config.buffer_size
            )));
        }
        let capture_channels = match config.capture {
            DeviceSelector::Disabled => 0,
            _ => self.capture_channels,
        };
        let playback_channels = match config.playback {
            DeviceSelector::Disabled => 0,
            _ => config
                .playback_channels
                .map_or(self.playback_channels, usize::from),
        };
        let info = StreamInfo {
            sample_rate: config.sample_rate,
            buffer_size: config.buffer_size,
            capture_channels,
            playback_channels,
        };
        info!(?info, "headless stream configured");
        self.info = Some(info);
        Ok(info)
    }

    fn start(&mut self, mut callback: AudioCallback) -> Result<(), DriverError> {
        let info = self.info.ok_or(DriverError::NotConfigured)?;
        if self.worker.is_some() {
            return Err(DriverError::Playback("already running".into()));
        }

        let frames = info.buffer_size as usize;
        let period = Duration::from_secs_f64(frames as f64 / info.sample_rate as f64);
        let paced = self.paced;
        let mut tap = self.tap.take();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let worker = std::thread::Builder::new()
            .name("mdlr-headless".into())
            .spawn(move || {
                let capture = vec![0.0; frames * info.capture_channels];
                let mut playback = vec![0.0; frames * info.playback_channels];
                let mut deadline = Instant::now();
                while running.load(Ordering::Acquire) {
                    callback(&capture, &mut playback);
                    if let Some(tap) = tap.as_mut() {
                        for &sample in &playback {
                            if tap.push(sample).is_err() {
                                break;
                            }
                        }
                    }
                    if paced {
                        deadline += period;
                        let now = Instant::now();
                        if deadline > now {
                            std::thread::sleep(deadline - now);
                        } else {
                            deadline = now;
                        }
                    }
                }
            })
            .map_err(|e| DriverError::StreamBuild(e.to_string()))?;

        self.worker = Some(worker);
        info!("headless stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DriverError> {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("headless render thread panicked");
                return Err(DriverError::Playback("render thread panicked".into()));
            }
            info!("headless stream stopped");
        }
        Ok(())
    }
}

impl Drop for HeadlessDriver {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn start_requires_configure() {
        let mut driver = HeadlessDriver::new(0, 1);
        let err = driver.start(Box::new(|_, _| {})).unwrap_err();
        assert!(matches!(err, DriverError::NotConfigured));
    }

    #[test]
    fn configure_honours_selectors() {
        let mut driver = HeadlessDriver::new(2, 2);
        let info = driver
            .configure(&DriverConfig::default().with_playback_channels(4))
            .unwrap();
        assert_eq!(info.capture_channels, 0);
        assert_eq!(info.playback_channels, 4);

        let config = DriverConfig::default().with_capture(DeviceSelector::Default);
        assert_eq!(driver.configure(&config).unwrap().capture_channels, 2);
        assert!(driver.configure(&config.with_buffer_size(0)).is_err());
    }

    #[test]
    fn runs_callback_and_feeds_tap() {
        let (producer, mut consumer) = rtrb::RingBuffer::new(64);
        let mut driver = HeadlessDriver::new(0, 1).with_tap(producer).free_running();
        driver
            .configure(&DriverConfig::default().with_buffer_size(8))
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        driver
            .start(Box::new(move |capture, playback| {
                assert!(capture.is_empty());
                playback.fill(0.25);
                seen.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        while calls.load(Ordering::Relaxed) < 4 {
            std::thread::yield_now();
        }
        driver.stop().unwrap();
        assert!(!driver.is_running());
        assert_eq!(consumer.pop(), Ok(0.25));
    }
}
