use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::detection::DetectionResult;
use sentinel_core::frame::Frame;

use crate::{Detector, InferenceError};

/// A synchronous, CPU-bound detection model.
pub trait DetectionModel: Send + Sync + 'static {
    fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError>;

    fn name(&self) -> &str;
}

/// Runs a [`DetectionModel`] on tokio's blocking pool so model calls never
/// stall the async workers.
pub struct BlockingDetector<M> {
    model: Arc<M>,
}

impl<M: DetectionModel> BlockingDetector<M> {
    pub fn new(model: M) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

#[async_trait]
impl<M: DetectionModel> Detector for BlockingDetector<M> {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        let model = Arc::clone(&self.model);
        let frame = frame.clone();
        tokio::task::spawn_blocking(move || model.detect(&frame))
            .await
            .map_err(|e| InferenceError::Failed(format!("model task panicked: {e}")))?
    }

    fn name(&self) -> &str {
        self.model.name()
    }
}
