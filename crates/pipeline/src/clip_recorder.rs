//! Evidence-clip recording.
//!
//! Per session the recorder moves `idle -> recording -> flushing -> idle`:
//!
//! - A qualifying frame (at least one accepted detection) with no window
//!   recording opens a window holding that frame.
//! - While a window records, every frame of the session is appended and
//!   qualifying frames push `last_detection_at` forward.
//! - A window is sealed once its quiet period or max duration has elapsed,
//!   or it reaches the max frame count. Sealing is a compare-and-set in the
//!   store, so exactly one caller wins and that caller flushes it.
//!
//! Every window mutation happens under the session's `clip:{id}` lease.
//! Flushing (archive + upload with retries) runs after the lease is
//! released, on a spawned task: once a window is sealed its flush finishes
//! even if the request that sealed it is dropped.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sentinel_cloud::ObjectStorage;
use sentinel_core::clip::{clip_object_key, order_frames, ClipFrame, ClipWindow, SealReason};
use sentinel_core::frame::Frame;
use sentinel_core::session::StreamSession;
use sentinel_core::store::{ClipStore, SessionStore, SharedStore, WindowOutcome};
use sentinel_core::types::Timestamp;

use crate::clip_archive::{build_archive, CLIP_CONTENT_TYPE};
use crate::error::PipelineError;
use crate::lease::{self, clip_lock_key};
use crate::settings::{chrono_duration, PipelineSettings};

/// What happened to one frame's clip state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClipReport {
    /// Window the frame was recorded into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_id: Option<String>,
    /// Frames in that window after this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u32>,
    /// Whether this frame opened the window.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub opened: bool,
    /// Windows sealed and flushed while handling this frame.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub flushed: Vec<FlushReport>,
}

impl ClipReport {
    pub fn is_empty(&self) -> bool {
        self.window_id.is_none() && self.flushed.is_empty()
    }
}

/// Result of flushing one sealed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushReport {
    pub window_id: String,
    pub reason: SealReason,
    #[serde(flatten)]
    pub outcome: FlushOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    Uploaded { object_key: String, frame_count: usize },
    Discarded { cause: String },
    /// The flush could not complete; the stale-flush sweep will close it.
    Abandoned { cause: String },
}

/// Counts from one sweep of clip windows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSweep {
    pub sealed: Vec<FlushReport>,
    pub stale_discarded: usize,
}

#[derive(Clone)]
pub struct ClipRecorder {
    store: Arc<dyn SharedStore>,
    storage: Arc<dyn ObjectStorage>,
    settings: PipelineSettings,
}

impl ClipRecorder {
    pub fn new(
        store: Arc<dyn SharedStore>,
        storage: Arc<dyn ObjectStorage>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            storage,
            settings,
        }
    }

    // -----------------------------------------------------------------------
    // Per-frame path
    // -----------------------------------------------------------------------

    /// Feed one admitted frame of `session` to the recorder.
    ///
    /// `qualifying` is whether the frame produced at least one accepted
    /// detection. Non-qualifying frames take no lease unless a window is
    /// recording.
    pub async fn on_frame(
        &self,
        session: &StreamSession,
        frame: &Frame,
        qualifying: bool,
        now: Timestamp,
    ) -> Result<ClipReport, PipelineError> {
        if !session.config.enable_clip_recording {
            return Ok(ClipReport::default());
        }
        if !qualifying && self.store.recording_window(&session.id).await?.is_none() {
            return Ok(ClipReport::default());
        }

        let clip_frame = ClipFrame {
            frame_index: frame.index,
            captured_at: now,
            content_type: frame.content_type().to_string(),
            payload: frame.payload.clone(),
        };

        let guard = lease::acquire(
            &self.store,
            &clip_lock_key(&session.id),
            &self.settings.clip_lease,
        )
        .await?;
        let locked = self
            .record_locked(&session.id, &clip_frame, qualifying, now)
            .await;
        guard.release().await;

        let (mut report, sealed) = locked?;
        for window in sealed {
            report.flushed.push(self.flush_detached(window).await);
        }
        Ok(report)
    }

    /// Window transitions for one frame. Caller holds the session lease.
    async fn record_locked(
        &self,
        session_id: &str,
        frame: &ClipFrame,
        qualifying: bool,
        now: Timestamp,
    ) -> Result<(ClipReport, Vec<ClipWindow>), PipelineError> {
        let policy = &self.settings.clip_policy;
        let mut report = ClipReport::default();
        let mut sealed = Vec::new();
        let detection_at = qualifying.then_some(now);

        let mut current = self.store.recording_window(session_id).await?;
        if let Some(reason) = current.as_ref().and_then(|w| policy.expiry(w, now)) {
            if let Some(window) = current.take() {
                sealed.extend(self.store.seal_window(&window.id, reason, now).await?);
            }
        }

        if let Some(window) = current {
            if let Some(count) = self
                .store
                .append_frame(&window.id, frame, detection_at)
                .await?
            {
                report.window_id = Some(window.id.clone());
                report.frame_count = Some(count);
                if policy.is_full(count) {
                    sealed.extend(
                        self.store
                            .seal_window(&window.id, SealReason::MaxFrames, now)
                            .await?,
                    );
                }
            }
        }

        if report.window_id.is_none() && qualifying && self.session_active(session_id).await? {
            let window = ClipWindow::open(session_id, now);
            if self.store.open_window(&window).await? {
                tracing::info!(session_id, window_id = %window.id, "Clip window opened");
                if let Some(count) = self
                    .store
                    .append_frame(&window.id, frame, detection_at)
                    .await?
                {
                    report.window_id = Some(window.id.clone());
                    report.frame_count = Some(count);
                    report.opened = true;
                    if policy.is_full(count) {
                        sealed.extend(
                            self.store
                                .seal_window(&window.id, SealReason::MaxFrames, now)
                                .await?,
                        );
                    }
                }
            } else {
                tracing::warn!(session_id, "Recording window appeared while lease was held");
            }
        }

        Ok((report, sealed))
    }

    async fn session_active(&self, session_id: &str) -> Result<bool, PipelineError> {
        Ok(self
            .store
            .get_session(session_id)
            .await?
            .is_some_and(|s| s.is_active()))
    }

    // -----------------------------------------------------------------------
    // Stop path
    // -----------------------------------------------------------------------

    /// Seal the session's recording window (if any) because the session
    /// stopped, and flush it.
    pub async fn close_for_stop(
        &self,
        session_id: &str,
        now: Timestamp,
    ) -> Result<Option<FlushReport>, PipelineError> {
        let guard = lease::acquire(
            &self.store,
            &clip_lock_key(session_id),
            &self.settings.clip_lease,
        )
        .await?;
        let sealed = self.seal_recording(session_id, now, |_| Some(SealReason::SessionStopped)).await;
        guard.release().await;

        match sealed? {
            Some(window) => Ok(Some(self.flush_detached(window).await)),
            None => Ok(None),
        }
    }

    /// Re-read the session's recording window and seal it if `decide` says
    /// so. Caller holds the session lease.
    async fn seal_recording(
        &self,
        session_id: &str,
        now: Timestamp,
        decide: impl Fn(&ClipWindow) -> Option<SealReason>,
    ) -> Result<Option<ClipWindow>, PipelineError> {
        let Some(window) = self.store.recording_window(session_id).await? else {
            return Ok(None);
        };
        let Some(reason) = decide(&window) else {
            return Ok(None);
        };
        Ok(self.store.seal_window(&window.id, reason, now).await?)
    }

    // -----------------------------------------------------------------------
    // Background sweep
    // -----------------------------------------------------------------------

    /// Seal and flush recording windows whose time limits passed without
    /// further frames, and discard windows left `flushing` by a process
    /// that died mid-upload.
    pub async fn sweep_windows(&self, now: Timestamp) -> Result<WindowSweep, PipelineError> {
        let policy = &self.settings.clip_policy;
        let mut sweep = WindowSweep::default();

        for window in self.store.recording_windows().await? {
            if policy.expiry(&window, now).is_none() {
                continue;
            }
            let guard = match lease::acquire(
                &self.store,
                &clip_lock_key(&window.session_id),
                &self.settings.clip_lease,
            )
            .await
            {
                Ok(guard) => guard,
                Err(PipelineError::LockTimeout { .. }) => {
                    tracing::debug!(window_id = %window.id, "Window busy; left for next sweep");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let sealed = self
                .seal_recording(&window.session_id, now, |w| policy.expiry(w, now))
                .await;
            guard.release().await;

            if let Some(sealed) = sealed? {
                sweep.sealed.push(self.flush_detached(sealed).await);
            }
        }

        let cutoff = now - chrono_duration(self.settings.stale_flush_after);
        for window in self.store.stale_flushing_windows(cutoff).await? {
            tracing::warn!(
                window_id = %window.id,
                session_id = %window.session_id,
                sealed_at = ?window.sealed_at,
                "Discarding clip window stuck in flushing",
            );
            self.store
                .finish_window(&window.id, &WindowOutcome::Discarded, now)
                .await?;
            sweep.stale_discarded += 1;
        }

        Ok(sweep)
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    /// Flush `window` on its own task and wait for the report.
    ///
    /// Dropping the returned future does not cancel the flush.
    async fn flush_detached(&self, window: ClipWindow) -> FlushReport {
        let window_id = window.id.clone();
        let reason = window.seal_reason.unwrap_or(SealReason::QuietPeriod);
        let recorder = self.clone();

        match tokio::spawn(async move { recorder.flush(window).await }).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(window_id = %window_id, error = %e, "Clip flush task failed");
                FlushReport {
                    window_id,
                    reason,
                    outcome: FlushOutcome::Abandoned {
                        cause: e.to_string(),
                    },
                }
            }
        }
    }

    /// Archive and upload a window this process sealed.
    ///
    /// Never fails: errors end in `Discarded` (nothing to upload, retries
    /// exhausted) or `Abandoned` (store unreachable, window left flushing).
    pub async fn flush(&self, window: ClipWindow) -> FlushReport {
        let reason = window.seal_reason.unwrap_or(SealReason::QuietPeriod);
        let window_id = window.id.clone();
        let outcome = match self.try_flush(&window).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(window_id = %window.id, error = %e, "Clip flush abandoned");
                FlushOutcome::Abandoned {
                    cause: e.to_string(),
                }
            }
        };
        FlushReport {
            window_id,
            reason,
            outcome,
        }
    }

    async fn try_flush(&self, window: &ClipWindow) -> Result<FlushOutcome, PipelineError> {
        let mut frames = self.store.window_frames(&window.id).await?;
        if frames.is_empty() {
            self.finish(window, WindowOutcome::Discarded).await?;
            return Ok(FlushOutcome::Discarded {
                cause: "window held no frames".to_string(),
            });
        }
        order_frames(&mut frames);

        let archive = match build_archive(window, &frames) {
            Ok(archive) => archive,
            Err(e) => {
                tracing::error!(window_id = %window.id, error = %e, "Clip archive failed");
                self.finish(window, WindowOutcome::Discarded).await?;
                return Ok(FlushOutcome::Discarded {
                    cause: e.to_string(),
                });
            }
        };

        let key = clip_object_key(&self.settings.clip_prefix, window);
        let retry = &self.settings.upload_retry;
        let attempts = retry.attempts();
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self
                .storage
                .put_object(&key, archive.bytes.clone(), CLIP_CONTENT_TYPE)
                .await
            {
                Ok(()) => {
                    self.finish(
                        window,
                        WindowOutcome::Uploaded {
                            object_key: key.clone(),
                        },
                    )
                    .await?;
                    tracing::info!(
                        window_id = %window.id,
                        session_id = %window.session_id,
                        object_key = %key,
                        frames = archive.frame_count,
                        bytes = archive.bytes.len(),
                        sha256 = %archive.sha256,
                        storage = self.storage.name(),
                        "Clip uploaded",
                    );
                    tracing::info!(
                        target: "sentinel::metrics",
                        session_id = %window.session_id,
                        clip_frames = archive.frame_count,
                        clip_bytes = archive.bytes.len(),
                        upload_attempts = attempt,
                        "clip_uploaded",
                    );
                    return Ok(FlushOutcome::Uploaded {
                        object_key: key,
                        frame_count: archive.frame_count,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        window_id = %window.id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Clip upload failed",
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(retry.jittered_delay(attempt)).await;
                    }
                }
            }
        }

        tracing::error!(
            window_id = %window.id,
            session_id = %window.session_id,
            attempts,
            "Clip upload retries exhausted; clip dropped",
        );
        self.finish(window, WindowOutcome::Discarded).await?;
        Ok(FlushOutcome::Discarded {
            cause: format!("upload failed after {attempts} attempts: {last_error}"),
        })
    }

    async fn finish(&self, window: &ClipWindow, outcome: WindowOutcome) -> Result<(), PipelineError> {
        self.store
            .finish_window(&window.id, &outcome, Utc::now())
            .await?;
        Ok(())
    }
}
