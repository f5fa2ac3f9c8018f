//! Row types for the `stream_sessions` table.

use sqlx::FromRow;
use sentinel_core::error::CoreError;
use sentinel_core::session::{SessionConfig, SessionStatus, StreamSession};
use sentinel_core::types::Timestamp;

use super::to_u64;

/// A row from the `stream_sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: String,
    pub frame_sample_rate: i32,
    pub min_confidence: f64,
    pub enable_clip_recording: bool,
    pub max_detections_per_frame: i32,
    pub status: String,
    pub frame_count: i64,
    pub sampled_count: i64,
    pub detection_count: i64,
    pub created_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub stopped_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
}

impl TryFrom<SessionRow> for StreamSession {
    type Error = CoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(StreamSession {
            status: SessionStatus::parse(&row.status)?,
            config: SessionConfig {
                frame_sample_rate: u32::try_from(row.frame_sample_rate).unwrap_or(1).max(1),
                min_confidence: row.min_confidence,
                enable_clip_recording: row.enable_clip_recording,
                max_detections_per_frame: u32::try_from(row.max_detections_per_frame)
                    .unwrap_or(1)
                    .max(1),
            },
            id: row.id,
            frame_count: to_u64(row.frame_count),
            sampled_count: to_u64(row.sampled_count),
            detection_count: to_u64(row.detection_count),
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
            stopped_at: row.stopped_at,
            expires_at: row.expires_at,
        })
    }
}

/// Aggregate counters over `stream_sessions`.
#[derive(Debug, Clone, FromRow)]
pub struct SessionAggregateRow {
    pub active_sessions: i64,
    pub stopped_sessions: i64,
    pub total_frames: i64,
    pub total_sampled_frames: i64,
    pub total_detections: i64,
}
