use std::sync::{Arc, RwLock};
use std::time::Duration;

use sentinel_core::detection::DetectionResult;
use sentinel_core::frame::Frame;

use crate::{Detector, InferenceError};

/// Default bound on a single inference call.
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// The detector installed in this process.
///
/// Created once at startup and passed to request handlers through
/// application state. Until a detector is installed every call fails with
/// [`InferenceError::Unavailable`].
pub struct InferenceContext {
    detector: RwLock<Option<Arc<dyn Detector>>>,
    timeout: Duration,
}

impl InferenceContext {
    /// A context with no detector installed yet.
    pub fn new(timeout: Duration) -> Self {
        Self {
            detector: RwLock::new(None),
            timeout,
        }
    }

    pub fn with_detector(detector: Arc<dyn Detector>, timeout: Duration) -> Self {
        Self {
            detector: RwLock::new(Some(detector)),
            timeout,
        }
    }

    /// Install or replace the detector.
    pub fn install(&self, detector: Arc<dyn Detector>) {
        tracing::info!(detector = detector.name(), "Detector installed");
        *self.write() = Some(detector);
    }

    pub fn uninstall(&self) {
        *self.write() = None;
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }

    /// Name of the installed detector, if any.
    pub fn detector_name(&self) -> Option<String> {
        self.current().map(|d| d.name().to_string())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run the installed detector on `frame`, bounded by the timeout.
    pub async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        let detector = self
            .current()
            .ok_or_else(|| InferenceError::Unavailable("no detector loaded".to_string()))?;

        match tokio::time::timeout(self.timeout, detector.detect(frame)).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(self.timeout)),
        }
    }

    fn current(&self) -> Option<Arc<dyn Detector>> {
        self.detector
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<dyn Detector>>> {
        self.detector
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use image::ImageFormat;
    use sentinel_core::detection::BoundingBox;

    use super::*;

    struct Fixed;

    #[async_trait]
    impl Detector for Fixed {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            Ok(vec![DetectionResult::new(
                "person",
                0.9,
                BoundingBox { x1: 0.0, y1: 0.0, x2: 1.0, y2: 1.0 },
            )])
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct Stalled;

    #[async_trait]
    impl Detector for Stalled {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn frame() -> Frame {
        Frame {
            index: 0,
            payload: vec![],
            format: ImageFormat::Png,
            width: 640,
            height: 480,
        }
    }

    #[tokio::test]
    async fn unavailable_until_installed() {
        let ctx = InferenceContext::new(DEFAULT_INFERENCE_TIMEOUT);
        assert!(!ctx.is_ready());
        assert_matches!(ctx.detect(&frame()).await, Err(InferenceError::Unavailable(_)));

        ctx.install(Arc::new(Fixed));
        assert!(ctx.is_ready());
        assert_eq!(ctx.detector_name().as_deref(), Some("fixed"));
        assert_eq!(ctx.detect(&frame()).await.unwrap().len(), 1);

        ctx.uninstall();
        assert!(!ctx.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_detector_times_out() {
        let ctx = InferenceContext::with_detector(Arc::new(Stalled), Duration::from_secs(2));
        assert_matches!(
            ctx.detect(&frame()).await,
            Err(InferenceError::Timeout(d)) if d == Duration::from_secs(2)
        );
    }
}
