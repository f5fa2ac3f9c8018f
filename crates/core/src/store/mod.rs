//! Contract of the shared session store.
//!
//! The store is the only mutable state shared between worker processes.
//! Every method is a single atomic operation from the caller's point of
//! view: counters are incremented in place, status changes are
//! compare-and-set, and creation is insert-if-absent. Callers never read a
//! value, modify it, and write it back.
//!
//! Implementations: `sentinel_db::PgStore` (Postgres) and
//! [`memory::MemoryStore`] (single process, tests and local development).

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::clip::{ClipFrame, ClipWindow, SealReason};
use crate::detection::DetectionRecord;
use crate::stats::StoreAggregate;
use crate::types::Timestamp;
use crate::session::StreamSession;

/// Errors surfaced by a store implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or timed out.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed the operation.
    #[error("Store error: {0}")]
    Backend(String),
}

/// Result of admitting a submitted frame to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAdmission {
    /// The frame counter was incremented; the updated record is returned.
    Admitted(StreamSession),
    Stopped,
    NotFound,
}

/// Result of recording the detections of one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Recorded { detection_count: u64 },
    Stopped,
    NotFound,
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// This call flipped the session from active to stopped.
    Stopped(StreamSession),
    AlreadyStopped,
    NotFound,
}

/// Terminal state of a flushed window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Uploaded { object_key: String },
    Discarded,
}

/// Session records, counters, and detection history.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new active session.
    ///
    /// Returns `false` when an active session with the same id exists. A
    /// stopped session with the same id is replaced, together with its
    /// history and clip windows.
    async fn create_session(&self, session: &StreamSession) -> Result<bool, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<StreamSession>, StoreError>;

    /// Increment `frame_count` and touch `last_activity_at`, if active.
    async fn admit_frame(&self, id: &str, now: Timestamp) -> Result<FrameAdmission, StoreError>;

    /// If active: `sampled_count += 1`, `detection_count += records.len()`,
    /// append `records` to the history and evict the oldest entries beyond
    /// `history_cap`. All in one atomic step.
    async fn record_detections(
        &self,
        id: &str,
        records: &[DetectionRecord],
        history_cap: usize,
        now: Timestamp,
    ) -> Result<RecordOutcome, StoreError>;

    /// Most recent history entries, newest first.
    async fn recent_detections(
        &self,
        id: &str,
        limit: usize,
    ) -> Result<Vec<DetectionRecord>, StoreError>;

    /// Compare-and-set `active -> stopped`, recording `expires_at`.
    async fn stop_session(
        &self,
        id: &str,
        now: Timestamp,
        expires_at: Timestamp,
    ) -> Result<StopOutcome, StoreError>;

    /// Ids of active sessions whose last activity is older than `cutoff`.
    async fn idle_sessions(&self, cutoff: Timestamp) -> Result<Vec<String>, StoreError>;

    /// Delete stopped sessions whose `expires_at` has passed. Returns the
    /// number of sessions removed.
    async fn purge_expired(&self, now: Timestamp) -> Result<u64, StoreError>;

    async fn aggregate(&self) -> Result<StoreAggregate, StoreError>;

    /// Cheap round trip used by health checks and the store watchdog.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Lease-based advisory locks.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take `key` for `holder` if it is free or its lease has expired.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        lease: Duration,
    ) -> Result<bool, StoreError>;

    /// Release `key` if `holder` still owns it. Returns whether a lease was
    /// removed.
    async fn release(&self, key: &str, holder: &str) -> Result<bool, StoreError>;
}

/// Clip windows and their buffered frames.
#[async_trait]
pub trait ClipStore: Send + Sync {
    /// The session's window in `recording`, if any.
    async fn recording_window(&self, session_id: &str) -> Result<Option<ClipWindow>, StoreError>;

    /// Insert a window in `recording`. Returns `false` if the session already
    /// has one.
    async fn open_window(&self, window: &ClipWindow) -> Result<bool, StoreError>;

    /// Append a frame to a recording window and return the window's new
    /// frame count. A frame index already buffered is not appended twice.
    /// `detection_at` moves `last_detection_at` forward for qualifying
    /// frames. Returns `None` if the window is no longer recording.
    async fn append_frame(
        &self,
        window_id: &str,
        frame: &ClipFrame,
        detection_at: Option<Timestamp>,
    ) -> Result<Option<u32>, StoreError>;

    /// Compare-and-set `recording -> flushing`. Returns the sealed window, or
    /// `None` if another caller sealed it first.
    async fn seal_window(
        &self,
        window_id: &str,
        reason: SealReason,
        now: Timestamp,
    ) -> Result<Option<ClipWindow>, StoreError>;

    /// Buffered frames of a window, in no particular order.
    async fn window_frames(&self, window_id: &str) -> Result<Vec<ClipFrame>, StoreError>;

    /// Move a flushing window to its terminal state and drop its frames.
    async fn finish_window(
        &self,
        window_id: &str,
        outcome: &WindowOutcome,
        now: Timestamp,
    ) -> Result<(), StoreError>;

    /// All windows currently in `recording`, across sessions.
    async fn recording_windows(&self) -> Result<Vec<ClipWindow>, StoreError>;

    /// Windows that have been `flushing` since before `sealed_before`.
    async fn stale_flushing_windows(
        &self,
        sealed_before: Timestamp,
    ) -> Result<Vec<ClipWindow>, StoreError>;
}

/// Everything the pipeline needs from the shared store.
pub trait SharedStore: SessionStore + LeaseStore + ClipStore {}

impl<T: SessionStore + LeaseStore + ClipStore> SharedStore for T {}
