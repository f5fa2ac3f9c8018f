//! Repository for the `stream_sessions` and `session_detections` tables.

use sqlx::PgPool;
use sentinel_core::detection::DetectionRecord;
use sentinel_core::session::StreamSession;
use sentinel_core::types::Timestamp;

use crate::models::detection::DetectionRow;
use crate::models::session::{SessionAggregateRow, SessionRow};
use crate::models::to_i64;

/// Column list for `stream_sessions` queries.
const COLUMNS: &str = "\
    id, frame_sample_rate, min_confidence, enable_clip_recording, \
    max_detections_per_frame, status, frame_count, sampled_count, \
    detection_count, created_at, last_activity_at, stopped_at, expires_at";

/// Column list for `session_detections` queries.
const DETECTION_COLUMNS: &str = "\
    id, session_id, frame_index, class_name, confidence, x1, y1, x2, y2, recorded_at";

/// Session records, counters, and detection history.
pub struct SessionRepo;

impl SessionRepo {
    // ── Creation ─────────────────────────────────────────────────────────

    /// Insert a new active session.
    ///
    /// A stopped session with the same id is deleted first (its history and
    /// clip windows cascade). Returns `false` when an active session holds
    /// the id.
    pub async fn create(pool: &PgPool, session: &StreamSession) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM stream_sessions WHERE id = $1 AND status = 'stopped'")
            .bind(&session.id)
            .execute(&mut *tx)
            .await?;

        let query = "\
            INSERT INTO stream_sessions (id, frame_sample_rate, min_confidence, \
                enable_clip_recording, max_detections_per_frame, status, \
                created_at, last_activity_at)
             VALUES ($1, $2, $3, $4, $5, 'active', $6, $6)
             ON CONFLICT (id) DO NOTHING
             RETURNING id";

        let inserted: Option<(String,)> = sqlx::query_as(query)
            .bind(&session.id)
            .bind(session.config.frame_sample_rate as i32)
            .bind(session.config.min_confidence)
            .bind(session.config.enable_clip_recording)
            .bind(session.config.max_detections_per_frame as i32)
            .bind(session.created_at)
            .fetch_optional(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted.is_some())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stream_sessions WHERE id = $1");
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Status of a session, or `None` if it does not exist.
    pub async fn find_status(pool: &PgPool, id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM stream_sessions WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(status,)| status))
    }

    /// Ids of active sessions idle since before `cutoff`.
    pub async fn list_idle(pool: &PgPool, cutoff: Timestamp) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM stream_sessions \
             WHERE status = 'active' AND last_activity_at < $1 \
             ORDER BY id ASC",
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Newest history entries first.
    pub async fn recent_detections(
        pool: &PgPool,
        id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {DETECTION_COLUMNS} FROM session_detections \
             WHERE session_id = $1 \
             ORDER BY id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, DetectionRow>(&query)
            .bind(id)
            .bind(limit as i64)
            .fetch_all(pool)
            .await
    }

    pub async fn aggregate(pool: &PgPool) -> Result<SessionAggregateRow, sqlx::Error> {
        sqlx::query_as::<_, SessionAggregateRow>(
            "SELECT \
                COUNT(*) FILTER (WHERE status = 'active') AS active_sessions, \
                COUNT(*) FILTER (WHERE status = 'stopped') AS stopped_sessions, \
                COALESCE(SUM(frame_count), 0)::BIGINT AS total_frames, \
                COALESCE(SUM(sampled_count), 0)::BIGINT AS total_sampled_frames, \
                COALESCE(SUM(detection_count), 0)::BIGINT AS total_detections \
             FROM stream_sessions",
        )
        .fetch_one(pool)
        .await
    }

    // ── Atomic counters ──────────────────────────────────────────────────

    /// Increment `frame_count` on an active session.
    ///
    /// Returns `None` if the session is missing or stopped.
    pub async fn admit_frame(
        pool: &PgPool,
        id: &str,
        now: Timestamp,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE stream_sessions SET \
                frame_count = frame_count + 1, \
                last_activity_at = GREATEST(last_activity_at, $2) \
             WHERE id = $1 AND status = 'active' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Count one sampled frame and its accepted detections, append them to
    /// the history, and evict history beyond `history_cap`.
    ///
    /// The counter update takes the session row lock, so concurrent calls
    /// for the same session serialize on it. Returns the new
    /// `detection_count`, or `None` if the session is missing or stopped.
    pub async fn record_detections(
        pool: &PgPool,
        id: &str,
        records: &[DetectionRecord],
        history_cap: usize,
        now: Timestamp,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE stream_sessions SET \
                sampled_count = sampled_count + 1, \
                detection_count = detection_count + $2, \
                last_activity_at = GREATEST(last_activity_at, $3) \
             WHERE id = $1 AND status = 'active' \
             RETURNING detection_count",
        )
        .bind(id)
        .bind(records.len() as i64)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((detection_count,)) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        for record in records {
            let bbox = &record.detection.bounding_box;
            sqlx::query(
                "INSERT INTO session_detections \
                    (session_id, frame_index, class_name, confidence, x1, y1, x2, y2, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(id)
            .bind(to_i64(record.frame_index))
            .bind(&record.detection.class_name)
            .bind(record.detection.confidence)
            .bind(bbox.x1)
            .bind(bbox.y1)
            .bind(bbox.x2)
            .bind(bbox.y2)
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        if !records.is_empty() {
            sqlx::query(
                "DELETE FROM session_detections \
                 WHERE session_id = $1 AND id IN ( \
                    SELECT id FROM session_detections \
                    WHERE session_id = $1 \
                    ORDER BY id DESC \
                    OFFSET $2)",
            )
            .bind(id)
            .bind(history_cap as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(detection_count))
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Compare-and-set `active -> stopped`.
    ///
    /// Returns the stopped row, or `None` if the session was not active.
    pub async fn stop(
        pool: &PgPool,
        id: &str,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE stream_sessions SET \
                status = 'stopped', \
                stopped_at = $2, \
                expires_at = $3 \
             WHERE id = $1 AND status = 'active' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(id)
            .bind(now)
            .bind(expires_at)
            .fetch_optional(pool)
            .await
    }

    /// Delete stopped sessions past their expiry. Returns the number removed.
    pub async fn purge_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM stream_sessions WHERE status = 'stopped' AND expires_at <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
