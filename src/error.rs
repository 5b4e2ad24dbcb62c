//! Pipeline error kinds.
//!
//! Fallible paths return `anyhow::Result`; the kind of failure travels inside
//! the `anyhow::Error` as a `PipelineError` so callers can `downcast_ref` when
//! they need to pick a policy (abort vs. keep running with an empty overlay).

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineError {
    /// No camera device matches the selector.
    DeviceUnavailable(String),
    /// The device exists but could not be configured or attached.
    ConfigurationError(String),
    /// The model or inference backend failed to initialize.
    InferenceSetupError(String),
    /// A single inference call failed. The frame is skipped.
    InferenceRequestError(String),
}

impl PipelineError {
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            PipelineError::ConfigurationError(_) => "CONFIGURATION_ERROR",
            PipelineError::InferenceSetupError(_) => "INFERENCE_SETUP_ERROR",
            PipelineError::InferenceRequestError(_) => "INFERENCE_REQUEST_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PipelineError::DeviceUnavailable(msg)
            | PipelineError::ConfigurationError(msg)
            | PipelineError::InferenceSetupError(msg)
            | PipelineError::InferenceRequestError(msg) => msg,
        }
    }

    /// Find the pipeline error kind anywhere in an `anyhow` chain.
    pub fn find(err: &anyhow::Error) -> Option<&PipelineError> {
        err.chain().find_map(|cause| cause.downcast_ref::<PipelineError>())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn kind_survives_context_wrapping() {
        let result: anyhow::Result<()> =
            Err(PipelineError::DeviceUnavailable("/dev/video9".to_string()).into());
        let err = result.context("start capture").unwrap_err();

        assert_eq!(
            PipelineError::find(&err),
            Some(&PipelineError::DeviceUnavailable("/dev/video9".to_string()))
        );
    }

    #[test]
    fn display_includes_code() {
        let err = PipelineError::InferenceSetupError("model missing".to_string());
        assert_eq!(err.to_string(), "INFERENCE_SETUP_ERROR: model missing");
    }
}
