//! Capture session manager.
//!
//! Opens a camera device and streams its frames to a consumer callback from a
//! dedicated producer thread:
//! - Synthetic devices (`stub://name`) for tests and demos
//! - V4L2 devices (feature: ingest-v4l2)
//!
//! The producer never waits on the consumer beyond the callback itself; a
//! consumer that cannot keep up must drop or supersede frames on its side.
//! Device-open failures are logged once and returned; nothing is retried.

mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::error::PipelineError;
use crate::frame::{Frame, Orientation};

pub use synthetic::SyntheticDevice;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Device;

/// Device node used for the rear-facing (default) camera.
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video0";

/// A source of frames. `next_frame` may block until the device has one.
pub trait CaptureDevice: Send {
    fn describe(&self) -> String;

    fn next_frame(&mut self) -> Result<Frame>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceSelector {
    /// The platform's default video capture device.
    RearFacing,
    /// An explicit device node, or `stub://name` for the synthetic device.
    Path(String),
}

impl DeviceSelector {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "rear" | "rear-facing" | "default" => DeviceSelector::RearFacing,
            other => DeviceSelector::Path(other.to_string()),
        }
    }

    fn device_path(&self) -> &str {
        match self {
            DeviceSelector::RearFacing => DEFAULT_VIDEO_DEVICE,
            DeviceSelector::Path(path) => path,
        }
    }
}

/// Fixed capture quality presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePreset {
    /// 4:3 still-photo framing.
    #[default]
    Photo,
    /// 16:9 HD video.
    High,
    Vga,
}

impl CapturePreset {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "photo" => Ok(CapturePreset::Photo),
            "high" => Ok(CapturePreset::High),
            "vga" => Ok(CapturePreset::Vga),
            other => Err(anyhow!("unknown capture preset '{}'", other)),
        }
    }

    pub fn dimensions(self) -> (u32, u32) {
        match self {
            CapturePreset::Photo => (1280, 960),
            CapturePreset::High => (1280, 720),
            CapturePreset::Vga => (640, 480),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub preset: CapturePreset,
    pub orientation: Orientation,
    /// Frames per second. The producer paces itself to this rate; 0 means
    /// "as fast as the device delivers".
    pub target_fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            preset: CapturePreset::Photo,
            orientation: Orientation::Right,
            target_fps: 30,
        }
    }
}

/// Resolve and open the device named by `selector`.
pub fn open_device(
    selector: &DeviceSelector,
    settings: &CaptureSettings,
) -> Result<Box<dyn CaptureDevice>> {
    let path = selector.device_path();
    if let Some(name) = path.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticDevice::new(name, settings)));
    }
    if !Path::new(path).exists() {
        return Err(PipelineError::DeviceUnavailable(format!(
            "no video capture device at {}",
            path
        ))
        .into());
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Device::open(path, settings)?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(PipelineError::ConfigurationError(format!(
            "cannot attach {}: device capture requires the ingest-v4l2 feature",
            path
        ))
        .into())
    }
}

/// Open the selected device and start streaming frames into `sink`.
///
/// On failure the error is logged here and returned; no frame is ever
/// delivered to `sink`.
pub fn start<F>(
    selector: &DeviceSelector,
    settings: &CaptureSettings,
    sink: F,
) -> Result<CaptureSession>
where
    F: FnMut(Frame) + Send + 'static,
{
    match open_device(selector, settings) {
        Ok(device) => Ok(CaptureSession::spawn(device, settings.target_fps, sink)),
        Err(err) => {
            log::error!("capture: unable to start {:?}: {:#}", selector, err);
            Err(err)
        }
    }
}

/// A running (or stopped) capture session.
pub struct CaptureSession {
    device: String,
    shutdown: Arc<AtomicBool>,
    delivered: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Stream frames from an already opened device.
    pub fn spawn<F>(mut device: Box<dyn CaptureDevice>, target_fps: u32, mut sink: F) -> Self
    where
        F: FnMut(Frame) + Send + 'static,
    {
        let description = device.describe();
        let shutdown = Arc::new(AtomicBool::new(false));
        let delivered = Arc::new(AtomicU64::new(0));
        let shutdown_thread = shutdown.clone();
        let delivered_thread = delivered.clone();
        let interval = (target_fps > 0).then(|| Duration::from_secs(1) / target_fps);

        log::info!("capture: streaming from {}", description);
        let join = std::thread::spawn(move || {
            while !shutdown_thread.load(Ordering::SeqCst) {
                let tick = Instant::now();
                match device.next_frame() {
                    Ok(frame) => {
                        if shutdown_thread.load(Ordering::SeqCst) {
                            break;
                        }
                        delivered_thread.fetch_add(1, Ordering::SeqCst);
                        sink(frame);
                    }
                    Err(err) => {
                        log::error!(
                            "capture: {} stopped delivering frames: {:#}",
                            device.describe(),
                            err
                        );
                        break;
                    }
                }
                if let Some(interval) = interval {
                    pace(&shutdown_thread, tick + interval);
                }
            }
            log::debug!("capture: producer for {} exited", device.describe());
        });

        Self {
            device: description,
            shutdown,
            delivered,
            join: Some(join),
        }
    }

    /// A session that never started. Stopping it is a no-op.
    pub fn inactive() -> Self {
        Self {
            device: String::from("none"),
            shutdown: Arc::new(AtomicBool::new(true)),
            delivered: Arc::new(AtomicU64::new(0)),
            join: None,
        }
    }

    /// Halt frame delivery. Idempotent; once this returns the sink is never
    /// called again.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("capture: producer for {} panicked", self.device);
            }
            log::info!(
                "capture: stopped {} after {} frames",
                self.device,
                self.frames_delivered()
            );
        }
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub fn frames_delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep until `deadline`, waking early when shutdown is requested.
fn pace(shutdown: &AtomicBool, deadline: Instant) {
    const STEP: Duration = Duration::from_millis(5);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(STEP));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn fast_settings() -> CaptureSettings {
        CaptureSettings {
            preset: CapturePreset::Vga,
            orientation: Orientation::Right,
            target_fps: 200,
        }
    }

    #[test]
    fn selector_parse() {
        assert_eq!(DeviceSelector::parse("rear"), DeviceSelector::RearFacing);
        assert_eq!(DeviceSelector::parse(""), DeviceSelector::RearFacing);
        assert_eq!(
            DeviceSelector::parse("/dev/video2"),
            DeviceSelector::Path("/dev/video2".to_string())
        );
    }

    #[test]
    fn missing_device_is_unavailable() {
        let selector = DeviceSelector::Path("/dev/no-such-camera-17".to_string());
        let err = open_device(&selector, &fast_settings())
            .err()
            .expect("open must fail");
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn synthetic_session_delivers_oriented_frames() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let selector = DeviceSelector::Path("stub://rear".to_string());
        let mut session = start(&selector, &fast_settings(), move |frame| {
            let _ = tx.send((frame.sequence, frame.width, frame.orientation));
        })?;

        let (sequence, width, orientation) = rx.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(sequence, 1);
        assert_eq!(width, 640);
        assert_eq!(orientation, Orientation::Right);

        session.stop();
        assert!(!session.is_running());
        assert!(session.frames_delivered() >= 1);
        Ok(())
    }

    #[test]
    fn stop_is_idempotent_and_final() -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let selector = DeviceSelector::Path("stub://rear".to_string());
        let mut session = start(&selector, &fast_settings(), move |frame| {
            let _ = tx.send(frame.sequence);
        })?;
        rx.recv_timeout(Duration::from_secs(5))?;

        session.stop();
        session.stop();
        let delivered = session.frames_delivered();
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        assert_eq!(session.frames_delivered(), delivered);
        Ok(())
    }

    #[test]
    fn inactive_session_stops_cleanly() {
        let mut session = CaptureSession::inactive();
        session.stop();
        session.stop();
        assert!(!session.is_running());
        assert_eq!(session.frames_delivered(), 0);
    }
}
