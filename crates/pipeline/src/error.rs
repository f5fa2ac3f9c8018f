use std::time::Duration;

use sentinel_core::error::CoreError;
use sentinel_core::store::StoreError;

/// Errors from the frame-processing pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Timed out acquiring lease '{key}' after {waited:?}")]
    LockTimeout { key: String, waited: Duration },

    #[error("Clip archive could not be built: {0}")]
    Archive(String),
}
