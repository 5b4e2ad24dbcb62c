//! Inference service: one loaded backend shared by every submission.
//!
//! Each submission runs on its own worker thread. The backend is guarded by a
//! `Mutex` because `InferenceBackend::detect` takes `&mut self`, so overlapping
//! submissions queue on the lock and complete in whatever order they get it.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{anyhow, Result};

use crate::config::ModelSettings;
use crate::error::PipelineError;
use crate::frame::Frame;

use super::backend::InferenceBackend;
use super::backends::ScriptedBackend;
use super::crop::CropScale;
use super::result::Detection;

#[derive(Clone)]
pub struct InferenceService {
    backend: Arc<Mutex<dyn InferenceBackend>>,
    backend_name: &'static str,
    policy: CropScale,
}

impl InferenceService {
    /// Wrap an already constructed backend. Runs the warm-up hook once.
    pub fn new<B: InferenceBackend + 'static>(mut backend: B, policy: CropScale) -> Result<Self> {
        let backend_name = backend.name();
        backend.warm_up().map_err(|err| {
            PipelineError::InferenceSetupError(format!(
                "backend '{}' warm-up failed: {:#}",
                backend_name, err
            ))
        })?;
        Ok(Self {
            backend: Arc::new(Mutex::new(backend)),
            backend_name,
            policy,
        })
    }

    /// Load the backend named in the model settings.
    ///
    /// Any failure is reported as `InferenceSetupError`; the caller decides
    /// whether that aborts startup.
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let setup_err = |err: anyhow::Error| -> anyhow::Error {
            PipelineError::InferenceSetupError(format!("{:#}", err)).into()
        };
        match settings.backend.as_str() {
            "scripted" => {
                let backend = ScriptedBackend::from_path(&settings.path).map_err(setup_err)?;
                Self::new(backend, settings.crop)
            }
            #[cfg(feature = "backend-tract")]
            "tract" => {
                let backend = super::backends::TractBackend::new(
                    &settings.path,
                    settings.input_width,
                    settings.input_height,
                )
                .map_err(setup_err)?
                .with_labels(settings.labels.clone());
                Self::new(backend, settings.crop)
            }
            #[cfg(not(feature = "backend-tract"))]
            "tract" => Err(setup_err(anyhow!(
                "the tract backend requires the backend-tract feature"
            ))),
            other => Err(setup_err(anyhow!("unknown inference backend '{}'", other))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn policy(&self) -> CropScale {
        self.policy
    }

    /// Run one frame on the calling thread. The frame is dropped on return.
    pub fn run(&self, frame: Frame) -> Result<Vec<Detection>> {
        let sequence = frame.sequence;
        let mut guard = self
            .backend
            .lock()
            .map_err(|_| anyhow!("inference backend lock poisoned"))?;
        guard.detect(&frame, self.policy).map_err(|err| {
            PipelineError::InferenceRequestError(format!("frame {}: {:#}", sequence, err)).into()
        })
    }

    /// Run one frame on a worker thread and hand the outcome to `on_complete`
    /// there. Returns immediately.
    pub fn spawn<F>(&self, frame: Frame, on_complete: F) -> PendingInference
    where
        F: FnOnce(Result<Vec<Detection>>) + Send + 'static,
    {
        let sequence = frame.sequence;
        let service = self.clone();
        let join = std::thread::spawn(move || {
            let outcome = service.run(frame);
            let ok = outcome.is_ok();
            on_complete(outcome);
            ok
        });
        PendingInference { sequence, join }
    }
}

/// Handle to an inference call running on a worker thread.
///
/// There is no cancellation: dropping the handle detaches the worker, which
/// still runs to completion.
#[derive(Debug)]
pub struct PendingInference {
    pub sequence: u64,
    join: JoinHandle<bool>,
}

impl PendingInference {
    /// Block until the call completes. `Ok(true)` when detections were
    /// produced, `Ok(false)` when the request failed.
    pub fn wait(self) -> Result<bool> {
        self.join
            .join()
            .map_err(|_| anyhow!("inference worker for frame {} panicked", self.sequence))
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptStep;
    use crate::detect::result::NormalizedRect;
    use crate::frame::{Orientation, PixelFormat};
    use std::sync::mpsc;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0; 4], 2, 2, PixelFormat::Gray8, Orientation::Up, sequence).unwrap()
    }

    struct FailingWarmUp;

    impl InferenceBackend for FailingWarmUp {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame, _policy: CropScale) -> Result<Vec<Detection>> {
            Ok(Vec::new())
        }

        fn warm_up(&mut self) -> Result<()> {
            Err(anyhow!("no accelerator"))
        }
    }

    #[test]
    fn warm_up_failure_is_setup_error() {
        let err = InferenceService::new(FailingWarmUp, CropScale::CenterCrop)
            .err()
            .expect("setup must fail");
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::InferenceSetupError(_))
        ));
    }

    #[test]
    fn missing_model_file_is_setup_error() {
        let settings = ModelSettings {
            backend: "scripted".to_string(),
            path: "/nonexistent/best.json".into(),
            ..ModelSettings::default()
        };
        let err = InferenceService::load(&settings).err().expect("load must fail");
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::InferenceSetupError(_))
        ));
    }

    #[test]
    fn unknown_backend_is_setup_error() {
        let settings = ModelSettings {
            backend: "coreml".to_string(),
            ..ModelSettings::default()
        };
        let err = InferenceService::load(&settings).err().expect("load must fail");
        assert_eq!(
            PipelineError::find(&err).map(|e| e.code()),
            Some("INFERENCE_SETUP_ERROR")
        );
    }

    #[test]
    fn request_failure_is_request_error() -> Result<()> {
        let backend = ScriptedBackend::new(vec![ScriptStep::failure("blurred")])?;
        let service = InferenceService::new(backend, CropScale::CenterCrop)?;
        let err = service.run(frame(7)).unwrap_err();
        assert!(matches!(
            PipelineError::find(&err),
            Some(PipelineError::InferenceRequestError(msg)) if msg.contains("frame 7")
        ));
        Ok(())
    }

    #[test]
    fn spawn_delivers_result_to_callback() -> Result<()> {
        let det = Detection::new(NormalizedRect::new(0.0, 0.0, 0.5, 0.5), 0.3);
        let backend = ScriptedBackend::new(vec![ScriptStep::detections(vec![det.clone()])])?;
        let service = InferenceService::new(backend, CropScale::CenterCrop)?;

        let (tx, rx) = mpsc::channel();
        let pending = service.spawn(frame(1), move |outcome| {
            let _ = tx.send(outcome.map_err(|e| e.to_string()));
        });
        assert_eq!(pending.sequence, 1);
        assert!(pending.wait()?);
        assert_eq!(rx.recv()?, Ok(vec![det]));
        Ok(())
    }
}
