//! Session creation, teardown, idle expiry and purge.

use std::sync::Arc;

use serde::Serialize;
use sentinel_core::detection::DetectionRecord;
use sentinel_core::error::CoreError;
use sentinel_core::session::{
    generate_session_id, validate_session_id, SessionConfig, SessionStatus, StreamSession,
};
use sentinel_core::store::{SessionStore, SharedStore, StopOutcome};
use sentinel_core::types::Timestamp;

use crate::clip_recorder::{ClipRecorder, FlushReport};
use crate::error::PipelineError;
use crate::settings::{chrono_duration, PipelineSettings};

/// A session with its most recent detections, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: StreamSession,
    pub recent_detections: Vec<DetectionRecord>,
}

/// Result of a stop request.
#[derive(Debug, Clone, PartialEq)]
pub struct StopReport {
    pub session_id: String,
    pub status: SessionStatus,
    /// `false` when the session was already stopped.
    pub transitioned: bool,
    /// Flush of the window that was recording at stop time.
    pub clip: Option<FlushReport>,
}

pub struct SessionLifecycleManager {
    store: Arc<dyn SharedStore>,
    clips: Arc<ClipRecorder>,
    settings: PipelineSettings,
}

impl SessionLifecycleManager {
    pub fn new(
        store: Arc<dyn SharedStore>,
        clips: Arc<ClipRecorder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            clips,
            settings,
        }
    }

    /// Create an active session.
    ///
    /// Without `stream_id` a UUID is assigned. An active session with the
    /// same id is a `Conflict`; a stopped one is replaced.
    pub async fn create_session(
        &self,
        stream_id: Option<String>,
        config: SessionConfig,
        now: Timestamp,
    ) -> Result<StreamSession, PipelineError> {
        config.validate()?;
        let id = match stream_id {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => generate_session_id(),
        };

        let session = StreamSession::new(id, config, now);
        if !self.store.create_session(&session).await? {
            return Err(CoreError::Conflict(format!(
                "Stream session '{}' is already active",
                session.id
            ))
            .into());
        }

        tracing::info!(
            session_id = %session.id,
            frame_sample_rate = session.config.frame_sample_rate,
            min_confidence = session.config.min_confidence,
            clip_recording = session.config.enable_clip_recording,
            "Stream session created",
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: &str) -> Result<SessionView, PipelineError> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| CoreError::session_not_found(id))?;
        let recent_detections = self
            .store
            .recent_detections(id, self.settings.history_cap)
            .await?;
        Ok(SessionView {
            session,
            recent_detections,
        })
    }

    /// Stop a session. Stopping a stopped session is a no-op.
    ///
    /// The winner of the `active -> stopped` transition also seals and
    /// flushes the session's recording window. A clip failure does not
    /// undo the stop; the window is then closed by the background sweep.
    pub async fn stop_session(&self, id: &str, now: Timestamp) -> Result<StopReport, PipelineError> {
        let expires_at = now + chrono_duration(self.settings.stopped_retention);

        let session = match self.store.stop_session(id, now, expires_at).await? {
            StopOutcome::Stopped(session) => session,
            StopOutcome::AlreadyStopped => {
                tracing::debug!(session_id = id, "Stop of already stopped session");
                return Ok(StopReport {
                    session_id: id.to_string(),
                    status: SessionStatus::Stopped,
                    transitioned: false,
                    clip: None,
                });
            }
            StopOutcome::NotFound => return Err(CoreError::session_not_found(id).into()),
        };

        let clip = if session.config.enable_clip_recording {
            match self.clips.close_for_stop(id, now).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(session_id = id, error = %e, "Clip window not closed at stop");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            session_id = id,
            frames = session.frame_count,
            sampled = session.sampled_count,
            detections = session.detection_count,
            "Stream session stopped",
        );
        Ok(StopReport {
            session_id: session.id,
            status: session.status,
            transitioned: true,
            clip,
        })
    }

    /// Stop active sessions idle for longer than the session TTL. Returns
    /// the ids this call stopped.
    pub async fn sweep_idle(&self, now: Timestamp) -> Result<Vec<String>, PipelineError> {
        let cutoff = now - chrono_duration(self.settings.session_ttl);
        let mut stopped = Vec::new();

        for id in self.store.idle_sessions(cutoff).await? {
            match self.stop_session(&id, now).await {
                Ok(report) if report.transitioned => {
                    tracing::info!(session_id = %id, "Idle session expired");
                    stopped.push(id);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Idle session stop failed");
                }
            }
        }
        Ok(stopped)
    }

    /// Delete stopped sessions whose retention has passed.
    pub async fn purge_expired(&self, now: Timestamp) -> Result<u64, PipelineError> {
        let purged = self.store.purge_expired(now).await?;
        if purged > 0 {
            tracing::info!(purged, "Purged expired stream sessions");
        }
        Ok(purged)
    }
}
