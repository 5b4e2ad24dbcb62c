//! Live camera object detection with a bounding-box overlay.
//!
//! Frames flow one way:
//!
//! ```text
//! capture session -> frame slot -> inference service -> overlay inbox -> renderer
//! ```
//!
//! # Module Structure
//!
//! - `capture`: camera device selection and the frame-producing session
//! - `frame`: pixel buffers plus the orientation hint they were captured with
//! - `detect`: inference backends, crop/scale policy, the shared service
//! - `overlay`: normalized-to-pixel transform, overlay state, render surfaces
//! - `pipeline`: wires capture to inference and inference to the overlay
//! - `config`: file and environment configuration
//! - `error`: typed failure kinds carried inside `anyhow::Error`
//!
//! The renderer is owned by one thread. Inference completes on worker
//! threads and posts its batch through an `OverlayPoster`; each batch
//! replaces the whole overlay.

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod overlay;
pub mod pipeline;

pub use capture::{
    CaptureDevice, CapturePreset, CaptureSession, CaptureSettings, DeviceSelector,
    DEFAULT_VIDEO_DEVICE,
};
pub use config::{DetectorConfig, ModelSettings};
pub use detect::{
    CropScale, Detection, InferenceBackend, InferenceService, NormalizedRect, PendingInference,
    ScriptStep, ScriptedBackend,
};
pub use error::PipelineError;
pub use frame::{Frame, Orientation, PixelFormat};
pub use overlay::{
    overlay_channel, ImageSurface, OverlayInbox, OverlayPoster, OverlayRenderer,
    RecordingSurface, RenderStep, RenderSurface,
};
pub use pipeline::{DetectionPipeline, FrameSlot, LivePipeline, PipelinePhase, PipelineStats};
