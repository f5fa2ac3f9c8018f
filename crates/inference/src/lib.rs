//! Object-detection capability behind a narrow async interface.
//!
//! The pipeline only ever sees [`Detector`]. Concrete detectors:
//!
//! - [`remote::RemoteDetector`]: an HTTP inference service.
//! - [`blocking::BlockingDetector`]: a synchronous in-process model run on
//!   the blocking thread pool.
//! - [`cascade::CascadeDetector`]: a cheap annotator gating a specialist.
//!
//! [`context::InferenceContext`] holds the detector installed in this
//! process and bounds every call with a timeout.

pub mod blocking;
pub mod cascade;
pub mod context;
pub mod remote;

use std::time::Duration;

use async_trait::async_trait;
use sentinel_core::detection::DetectionResult;
use sentinel_core::frame::Frame;

pub use context::InferenceContext;

/// Errors from an inference call.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// No detector is loaded, or the inference backend cannot be reached.
    #[error("Inference unavailable: {0}")]
    Unavailable(String),

    /// The detector ran and failed on this frame.
    #[error("Inference failed: {0}")]
    Failed(String),

    /// The call did not finish within the configured timeout.
    #[error("Inference timed out after {0:?}")]
    Timeout(Duration),
}

impl InferenceError {
    /// Whether the frame should be rejected (as opposed to skipped).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, InferenceError::Unavailable(_))
    }
}

/// Find objects in one frame.
///
/// Implementations never retry internally; a failed frame is skipped by
/// the caller and the next sampled frame tries again.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError>;

    /// Short name for logs and health output.
    fn name(&self) -> &str;
}
