//! Repository for the `clip_windows` and `clip_frames` tables.

use sqlx::PgPool;
use sentinel_core::clip::{ClipFrame, ClipWindow, SealReason, WindowStatus};
use sentinel_core::types::Timestamp;

use crate::models::clip::{FrameRow, WindowAggregateRow, WindowRow};
use crate::models::to_i64;

/// Column list for `clip_windows` queries.
const COLUMNS: &str = "\
    id, session_id, status, opened_at, last_detection_at, frame_count, \
    sealed_at, seal_reason, object_key";

pub struct ClipRepo;

impl ClipRepo {
    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn find_recording(
        pool: &PgPool,
        session_id: &str,
    ) -> Result<Option<WindowRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clip_windows \
             WHERE session_id = $1 AND status = 'recording'"
        );
        sqlx::query_as::<_, WindowRow>(&query)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_status(
        pool: &PgPool,
        status: WindowStatus,
    ) -> Result<Vec<WindowRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clip_windows WHERE status = $1 ORDER BY opened_at ASC"
        );
        sqlx::query_as::<_, WindowRow>(&query)
            .bind(status.as_str())
            .fetch_all(pool)
            .await
    }

    pub async fn list_flushing_sealed_before(
        pool: &PgPool,
        sealed_before: Timestamp,
    ) -> Result<Vec<WindowRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clip_windows \
             WHERE status = 'flushing' AND sealed_at < $1 \
             ORDER BY sealed_at ASC"
        );
        sqlx::query_as::<_, WindowRow>(&query)
            .bind(sealed_before)
            .fetch_all(pool)
            .await
    }

    /// Buffered frames in clip order.
    pub async fn list_frames(pool: &PgPool, window_id: &str) -> Result<Vec<FrameRow>, sqlx::Error> {
        sqlx::query_as::<_, FrameRow>(
            "SELECT frame_index, captured_at, content_type, payload FROM clip_frames \
             WHERE window_id = $1 \
             ORDER BY frame_index ASC, captured_at ASC",
        )
        .bind(window_id)
        .fetch_all(pool)
        .await
    }

    pub async fn aggregate(pool: &PgPool) -> Result<WindowAggregateRow, sqlx::Error> {
        sqlx::query_as::<_, WindowAggregateRow>(
            "SELECT \
                COUNT(*) FILTER (WHERE status = 'recording') AS recording_windows, \
                COUNT(*) FILTER (WHERE status = 'flushing') AS flushing_windows, \
                COUNT(*) FILTER (WHERE status = 'uploaded') AS clips_uploaded, \
                COUNT(*) FILTER (WHERE status = 'discarded') AS clips_discarded \
             FROM clip_windows",
        )
        .fetch_one(pool)
        .await
    }

    // ── Mutations ────────────────────────────────────────────────────────

    /// Insert a recording window. The partial unique index on
    /// `(session_id) WHERE status = 'recording'` makes this fail softly
    /// (returns `false`) when the session already has one.
    pub async fn insert(pool: &PgPool, window: &ClipWindow) -> Result<bool, sqlx::Error> {
        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO clip_windows \
                (id, session_id, status, opened_at, last_detection_at, frame_count) \
             VALUES ($1, $2, 'recording', $3, $4, 0) \
             ON CONFLICT DO NOTHING \
             RETURNING id",
        )
        .bind(&window.id)
        .bind(&window.session_id)
        .bind(window.opened_at)
        .bind(window.last_detection_at)
        .fetch_optional(pool)
        .await?;
        Ok(inserted.is_some())
    }

    /// Append a frame to a recording window.
    ///
    /// Locks the window row, inserts the frame unless its index is already
    /// buffered, and bumps `frame_count` / `last_detection_at`. Returns the
    /// new frame count, or `None` if the window is not recording.
    pub async fn append_frame(
        pool: &PgPool,
        window_id: &str,
        frame: &ClipFrame,
        detection_at: Option<Timestamp>,
    ) -> Result<Option<i32>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM clip_windows WHERE id = $1 AND status = 'recording' FOR UPDATE",
        )
        .bind(window_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            "INSERT INTO clip_frames (window_id, frame_index, captured_at, content_type, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (window_id, frame_index) DO NOTHING",
        )
        .bind(window_id)
        .bind(to_i64(frame.frame_index))
        .bind(frame.captured_at)
        .bind(&frame.content_type)
        .bind(&frame.payload)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let (frame_count,): (i32,) = sqlx::query_as(
            "UPDATE clip_windows SET \
                frame_count = frame_count + $2, \
                last_detection_at = GREATEST(last_detection_at, COALESCE($3, last_detection_at)) \
             WHERE id = $1 \
             RETURNING frame_count",
        )
        .bind(window_id)
        .bind(inserted as i32)
        .bind(detection_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(frame_count))
    }

    /// Compare-and-set `recording -> flushing`.
    pub async fn seal(
        pool: &PgPool,
        window_id: &str,
        reason: SealReason,
        now: Timestamp,
    ) -> Result<Option<WindowRow>, sqlx::Error> {
        let query = format!(
            "UPDATE clip_windows SET \
                status = 'flushing', \
                sealed_at = $3, \
                seal_reason = $2 \
             WHERE id = $1 AND status = 'recording' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WindowRow>(&query)
            .bind(window_id)
            .bind(reason.as_str())
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Move a flushing window to `status` and drop its frames.
    pub async fn finish(
        pool: &PgPool,
        window_id: &str,
        status: WindowStatus,
        object_key: Option<&str>,
        now: Timestamp,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "UPDATE clip_windows SET \
                status = $2, \
                object_key = $3, \
                closed_at = $4 \
             WHERE id = $1 AND status = 'flushing'",
        )
        .bind(window_id)
        .bind(status.as_str())
        .bind(object_key)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM clip_frames WHERE window_id = $1")
            .bind(window_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
