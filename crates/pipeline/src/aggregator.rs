//! Confidence filtering and atomic per-session detection counters.

use std::sync::Arc;

use sentinel_core::detection::{filter_detections, DetectionRecord, DetectionResult};
use sentinel_core::error::CoreError;
use sentinel_core::session::StreamSession;
use sentinel_core::store::{RecordOutcome, SessionStore, SharedStore};
use sentinel_core::types::Timestamp;

use crate::error::PipelineError;

/// What one sampled frame contributed.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDelta {
    /// Detections that passed the session's filter, in model order.
    pub accepted: Vec<DetectionResult>,
    /// The session's `detection_count` after this frame.
    pub detection_count: u64,
}

pub struct DetectionAggregator {
    store: Arc<dyn SharedStore>,
    history_cap: usize,
}

impl DetectionAggregator {
    pub fn new(store: Arc<dyn SharedStore>, history_cap: usize) -> Self {
        Self { store, history_cap }
    }

    /// Filter `detections` with the session's config and count them.
    ///
    /// The counters, history append and eviction happen in one store
    /// operation that only applies while the session is active, so results
    /// arriving after a stop are rejected with `SessionStopped`.
    pub async fn record(
        &self,
        session: &StreamSession,
        frame_index: u64,
        detections: Vec<DetectionResult>,
        now: Timestamp,
    ) -> Result<AggregateDelta, PipelineError> {
        let accepted = filter_detections(
            detections,
            session.config.min_confidence,
            session.config.max_detections_per_frame as usize,
        );

        let records: Vec<DetectionRecord> = accepted
            .iter()
            .map(|detection| DetectionRecord {
                frame_index,
                detection: detection.clone(),
                recorded_at: now,
            })
            .collect();

        match self
            .store
            .record_detections(&session.id, &records, self.history_cap, now)
            .await?
        {
            RecordOutcome::Recorded { detection_count } => Ok(AggregateDelta {
                accepted,
                detection_count,
            }),
            RecordOutcome::Stopped => Err(CoreError::SessionStopped(session.id.clone()).into()),
            RecordOutcome::NotFound => Err(CoreError::session_not_found(&session.id).into()),
        }
    }
}
