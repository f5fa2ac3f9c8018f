//! Row types for the `clip_windows` and `clip_frames` tables.

use sqlx::FromRow;
use sentinel_core::clip::{ClipFrame, ClipWindow, SealReason, WindowStatus};
use sentinel_core::error::CoreError;
use sentinel_core::types::Timestamp;

use super::to_u64;

/// A row from the `clip_windows` table.
#[derive(Debug, Clone, FromRow)]
pub struct WindowRow {
    pub id: String,
    pub session_id: String,
    pub status: String,
    pub opened_at: Timestamp,
    pub last_detection_at: Timestamp,
    pub frame_count: i32,
    pub sealed_at: Option<Timestamp>,
    pub seal_reason: Option<String>,
    pub object_key: Option<String>,
}

impl TryFrom<WindowRow> for ClipWindow {
    type Error = CoreError;

    fn try_from(row: WindowRow) -> Result<Self, Self::Error> {
        Ok(ClipWindow {
            status: WindowStatus::parse(&row.status)?,
            seal_reason: row.seal_reason.as_deref().map(SealReason::parse).transpose()?,
            id: row.id,
            session_id: row.session_id,
            opened_at: row.opened_at,
            last_detection_at: row.last_detection_at,
            frame_count: u32::try_from(row.frame_count).unwrap_or(0),
            sealed_at: row.sealed_at,
            object_key: row.object_key,
        })
    }
}

/// A row from the `clip_frames` table.
#[derive(Debug, Clone, FromRow)]
pub struct FrameRow {
    pub frame_index: i64,
    pub captured_at: Timestamp,
    pub content_type: String,
    pub payload: Vec<u8>,
}

impl From<FrameRow> for ClipFrame {
    fn from(row: FrameRow) -> Self {
        ClipFrame {
            frame_index: to_u64(row.frame_index),
            captured_at: row.captured_at,
            content_type: row.content_type,
            payload: row.payload,
        }
    }
}

/// Window counts by status.
#[derive(Debug, Clone, FromRow)]
pub struct WindowAggregateRow {
    pub recording_windows: i64,
    pub flushing_windows: i64,
    pub clips_uploaded: i64,
    pub clips_discarded: i64,
}
