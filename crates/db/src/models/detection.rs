//! Row types for the `session_detections` table.

use sqlx::FromRow;
use sentinel_core::detection::{BoundingBox, DetectionRecord, DetectionResult};
use sentinel_core::types::Timestamp;

use super::to_u64;

/// A row from the `session_detections` table.
#[derive(Debug, Clone, FromRow)]
pub struct DetectionRow {
    pub id: i64,
    pub session_id: String,
    pub frame_index: i64,
    pub class_name: String,
    pub confidence: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub recorded_at: Timestamp,
}

impl From<DetectionRow> for DetectionRecord {
    fn from(row: DetectionRow) -> Self {
        DetectionRecord {
            frame_index: to_u64(row.frame_index),
            detection: DetectionResult {
                class_name: row.class_name,
                confidence: row.confidence,
                bounding_box: BoundingBox {
                    x1: row.x1,
                    y1: row.y1,
                    x2: row.x2,
                    y2: row.y2,
                },
            },
            recorded_at: row.recorded_at,
        }
    }
}
