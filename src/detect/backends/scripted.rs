//! Scripted backend.
//!
//! Replays detection batches from a JSON script instead of running a model.
//! Each `detect` call consumes the next step; the script wraps around.
//!
//! ```json
//! {
//!   "steps": [
//!     { "detections": [ { "x": 0.1, "y": 0.2, "w": 0.3, "h": 0.3, "confidence": 0.9, "label": "car" } ] },
//!     { "fail": "sensor glare" },
//!     { "delay_ms": 40, "detections": [] }
//!   ]
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::InferenceBackend;
use crate::detect::crop::CropScale;
use crate::detect::result::Detection;
use crate::frame::Frame;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
}

impl ScriptStep {
    pub fn detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            fail: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    steps: Vec<ScriptStep>,
}

pub struct ScriptedBackend {
    steps: Vec<ScriptStep>,
    cursor: usize,
    calls: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<ScriptStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(anyhow!("detection script has no steps"));
        }
        Ok(Self {
            steps,
            cursor: 0,
            calls: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Load a script from a JSON file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detection script {}", path.display()))?;
        let script: ScriptFile = serde_json::from_str(&raw)
            .with_context(|| format!("invalid detection script {}", path.display()))?;
        Self::new(script.steps)
    }

    /// Shared counter of `detect` calls, readable after the backend has been
    /// moved into a service.
    pub fn call_counter(&self) -> Arc<AtomicU64> {
        self.calls.clone()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame, _policy: CropScale) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = &self.steps[self.cursor];
        self.cursor = (self.cursor + 1) % self.steps.len();

        if step.delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(step.delay_ms));
        }
        if let Some(reason) = &step.fail {
            return Err(anyhow!("frame {}: {}", frame.sequence, reason));
        }
        Ok(step.detections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::NormalizedRect;
    use crate::frame::{Orientation, PixelFormat};
    use std::io::Write;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0; 4], 2, 2, PixelFormat::Gray8, Orientation::Up, sequence).unwrap()
    }

    #[test]
    fn cycles_through_steps() -> Result<()> {
        let det = Detection::new(NormalizedRect::new(0.1, 0.1, 0.2, 0.2), 0.4);
        let mut backend = ScriptedBackend::new(vec![
            ScriptStep::detections(vec![det.clone()]),
            ScriptStep::failure("glare"),
        ])?;
        let counter = backend.call_counter();

        assert_eq!(backend.detect(&frame(1), CropScale::CenterCrop)?, vec![det.clone()]);
        assert!(backend.detect(&frame(2), CropScale::CenterCrop).is_err());
        assert_eq!(backend.detect(&frame(3), CropScale::CenterCrop)?, vec![det]);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn empty_script_is_rejected() {
        assert!(ScriptedBackend::new(Vec::new()).is_err());
    }

    #[test]
    fn loads_script_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{"steps": [{{"detections": [{{"x": 0.5, "y": 0.5, "w": 0.1, "h": 0.1, "confidence": 0.7}}]}}, {{"fail": "x"}}]}}"#
        )?;
        let mut backend = ScriptedBackend::from_path(file.path())?;
        let dets = backend.detect(&frame(1), CropScale::ScaleFill)?;
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, None);
        Ok(())
    }
}
