use std::time::Duration;

use async_trait::async_trait;
use sentinel_core::clip::{ClipFrame, ClipWindow, SealReason, WindowStatus};
use sentinel_core::detection::DetectionRecord;
use sentinel_core::session::StreamSession;
use sentinel_core::stats::StoreAggregate;
use sentinel_core::store::{
    ClipStore, FrameAdmission, LeaseStore, RecordOutcome, SessionStore, StopOutcome, StoreError,
    WindowOutcome,
};
use sentinel_core::types::Timestamp;

use crate::models::to_u64;
use crate::repositories::{ClipRepo, LeaseRepo, SessionRepo};
use crate::DbPool;

/// Expired leases linger this long before the purge sweep removes them.
const LEASE_PURGE_GRACE: Duration = Duration::from_secs(3600);

/// [`SessionStore`], [`LeaseStore`] and [`ClipStore`] over a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Distinguish "stopped" from "missing" after a guarded update matched
    /// no row.
    async fn session_state(&self, id: &str) -> Result<Option<String>, StoreError> {
        SessionRepo::find_status(&self.pool, id)
            .await
            .map_err(map_sqlx)
    }
}

/// Connection-level failures are reported as unavailability; everything
/// else is a backend error.
fn map_sqlx(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

fn map_row<T, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::Backend(format!("Malformed row: {e}")))
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, session: &StreamSession) -> Result<bool, StoreError> {
        SessionRepo::create(&self.pool, session).await.map_err(map_sqlx)
    }

    async fn get_session(&self, id: &str) -> Result<Option<StreamSession>, StoreError> {
        let row = SessionRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| map_row(StreamSession::try_from(r))).transpose()
    }

    async fn admit_frame(&self, id: &str, now: Timestamp) -> Result<FrameAdmission, StoreError> {
        match SessionRepo::admit_frame(&self.pool, id, now)
            .await
            .map_err(map_sqlx)?
        {
            Some(row) => Ok(FrameAdmission::Admitted(map_row(StreamSession::try_from(
                row,
            ))?)),
            None => Ok(match self.session_state(id).await? {
                Some(_) => FrameAdmission::Stopped,
                None => FrameAdmission::NotFound,
            }),
        }
    }

    async fn record_detections(
        &self,
        id: &str,
        records: &[DetectionRecord],
        history_cap: usize,
        now: Timestamp,
    ) -> Result<RecordOutcome, StoreError> {
        match SessionRepo::record_detections(&self.pool, id, records, history_cap, now)
            .await
            .map_err(map_sqlx)?
        {
            Some(count) => Ok(RecordOutcome::Recorded {
                detection_count: to_u64(count),
            }),
            None => Ok(match self.session_state(id).await? {
                Some(_) => RecordOutcome::Stopped,
                None => RecordOutcome::NotFound,
            }),
        }
    }

    async fn recent_detections(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError> {
        let rows = SessionRepo::recent_detections(&self.pool, id, limit)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(DetectionRecord::from).collect())
    }

    async fn stop_session(
        &self,
        id: &str,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<StopOutcome, StoreError> {
        match SessionRepo::stop(&self.pool, id, now, expires_at)
            .await
            .map_err(map_sqlx)?
        {
            Some(row) => Ok(StopOutcome::Stopped(map_row(StreamSession::try_from(row))?)),
            None => Ok(match self.session_state(id).await? {
                Some(_) => StopOutcome::AlreadyStopped,
                None => StopOutcome::NotFound,
            }),
        }
    }

    async fn idle_sessions(&self, cutoff: Timestamp) -> Result<Vec<String>, StoreError> {
        SessionRepo::list_idle(&self.pool, cutoff)
            .await
            .map_err(map_sqlx)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError> {
        let purged = SessionRepo::purge_expired(&self.pool, now)
            .await
            .map_err(map_sqlx)?;
        let leases = LeaseRepo::purge_expired(&self.pool, LEASE_PURGE_GRACE)
            .await
            .map_err(map_sqlx)?;
        if leases > 0 {
            tracing::debug!(leases, "Purged expired coordination leases");
        }
        Ok(purged)
    }

    async fn aggregate(&self) -> Result<StoreAggregate, StoreError> {
        let sessions = SessionRepo::aggregate(&self.pool)
            .await
            .map_err(map_sqlx)?;
        let windows = ClipRepo::aggregate(&self.pool).await.map_err(map_sqlx)?;
        Ok(StoreAggregate {
            active_sessions: to_u64(sessions.active_sessions),
            stopped_sessions: to_u64(sessions.stopped_sessions),
            total_frames: to_u64(sessions.total_frames),
            total_sampled_frames: to_u64(sessions.total_sampled_frames),
            total_detections: to_u64(sessions.total_detections),
            recording_windows: to_u64(windows.recording_windows),
            flushing_windows: to_u64(windows.flushing_windows),
            clips_uploaded: to_u64(windows.clips_uploaded),
            clips_discarded: to_u64(windows.clips_discarded),
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await.map_err(map_sqlx)
    }
}

#[async_trait]
impl LeaseStore for PgStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        LeaseRepo::try_acquire(&self.pool, key, holder, lease)
            .await
            .map_err(map_sqlx)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        LeaseRepo::release(&self.pool, key, holder)
            .await
            .map_err(map_sqlx)
    }
}

#[async_trait]
impl ClipStore for PgStore {
    async fn recording_window(&self, session_id: &str) -> Result<Option<ClipWindow>, StoreError> {
        let row = ClipRepo::find_recording(&self.pool, session_id)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| map_row(ClipWindow::try_from(r))).transpose()
    }

    async fn open_window(&self, window: &ClipWindow) -> Result<bool, StoreError> {
        ClipRepo::insert(&self.pool, window).await.map_err(map_sqlx)
    }

    async fn append_frame(
        &self,
        window_id: &str,
        frame: &ClipFrame,
        detection_at: Option<Timestamp>,
    ) -> Result<Option<u32>, StoreError> {
        let count = ClipRepo::append_frame(&self.pool, window_id, frame, detection_at)
            .await
            .map_err(map_sqlx)?;
        Ok(count.map(|c| u32::try_from(c).unwrap_or(0)))
    }

    async fn seal_window(
        &self,
        window_id: &str,
        reason: SealReason,
        now: Timestamp,
    ) -> Result<Option<ClipWindow>, StoreError> {
        let row = ClipRepo::seal(&self.pool, window_id, reason, now)
            .await
            .map_err(map_sqlx)?;
        row.map(|r| map_row(ClipWindow::try_from(r))).transpose()
    }

    async fn window_frames(&self, window_id: &str) -> Result<Vec<ClipFrame>, StoreError> {
        let rows = ClipRepo::list_frames(&self.pool, window_id)
            .await
            .map_err(map_sqlx)?;
        Ok(rows.into_iter().map(ClipFrame::from).collect())
    }

    async fn finish_window(
        &self,
        window_id: &str,
        outcome: &WindowOutcome,
        now: Timestamp,
    ) -> Result<(), StoreError> {
        let (status, object_key) = match outcome {
            WindowOutcome::Uploaded { object_key } => {
                (WindowStatus::Uploaded, Some(object_key.as_str()))
            }
            WindowOutcome::Discarded => (WindowStatus::Discarded, None),
        };
        ClipRepo::finish(&self.pool, window_id, status, object_key, now)
            .await
            .map_err(map_sqlx)
    }

    async fn recording_windows(&self) -> Result<Vec<ClipWindow>, StoreError> {
        let rows = ClipRepo::list_by_status(&self.pool, WindowStatus::Recording)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|r| map_row(ClipWindow::try_from(r)))
            .collect()
    }

    async fn stale_flushing_windows(
        &self,
        sealed_before: Timestamp,
    ) -> Result<Vec<ClipWindow>, StoreError> {
        let rows = ClipRepo::list_flushing_sealed_before(&self.pool, sealed_before)
            .await
            .map_err(map_sqlx)?;
        rows.into_iter()
            .map(|r| map_row(ClipWindow::try_from(r)))
            .collect()
    }
}
