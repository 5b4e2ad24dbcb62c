mod backend;
mod backends;
mod crop;
mod result;
mod service;

pub use backend::InferenceBackend;
pub use backends::{ScriptStep, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use crop::{CropScale, Placement};
pub use result::{Detection, NormalizedRect};
pub use service::{InferenceService, PendingInference};
