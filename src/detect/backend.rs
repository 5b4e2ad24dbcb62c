use anyhow::Result;

use crate::frame::Frame;

use super::crop::CropScale;
use super::result::Detection;

/// Inference backend trait.
///
/// The backend is the opaque model-execution capability: a frame goes in,
/// detections come out. Implementations own everything about the model
/// (weights, input layout, output decoding).
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    ///
    /// Returned boxes are normalized to the full upright frame with a
    /// bottom-left origin, whatever `policy` was used to feed the model.
    fn detect(&mut self, frame: &Frame, policy: CropScale) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once when the service is loaded.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
