//! Aggregate statistics read from the shared store.

use serde::Serialize;

use crate::types::Timestamp;

/// Counters summed across every session the store still holds.
///
/// Reads are not transactional across keys; values may trail in-flight
/// writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreAggregate {
    pub active_sessions: u64,
    pub stopped_sessions: u64,
    pub total_frames: u64,
    pub total_sampled_frames: u64,
    pub total_detections: u64,
    pub recording_windows: u64,
    pub flushing_windows: u64,
    pub clips_uploaded: u64,
    pub clips_discarded: u64,
}

/// Statistics as served by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub aggregate: StoreAggregate,
    /// Whether this process has a detector installed.
    pub inference_ready: bool,
    /// When the aggregate was read from the store.
    pub generated_at: Timestamp,
    /// `true` when the store could not be read and an older (or empty)
    /// aggregate is served instead.
    pub stale: bool,
}
