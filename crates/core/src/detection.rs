//! Detection results and the confidence filter applied before counting.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Default number of recent detections retained per session.
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One object found by the inference capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub class_name: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

impl DetectionResult {
    pub fn new(class_name: impl Into<String>, confidence: f64, bounding_box: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bounding_box,
        }
    }
}

/// An accepted detection as kept in a session's recent history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub frame_index: u64,
    #[serde(flatten)]
    pub detection: DetectionResult,
    pub recorded_at: Timestamp,
}

/// Keep detections with `confidence >= min_confidence`, at most `max` of them.
///
/// Order is preserved, so truncation keeps the detections the model
/// reported first.
pub fn filter_detections(
    detections: Vec<DetectionResult>,
    min_confidence: f64,
    max: usize,
) -> Vec<DetectionResult> {
    detections
        .into_iter()
        .filter(|d| d.confidence.is_finite() && d.confidence >= min_confidence)
        .take(max)
        .collect()
}
