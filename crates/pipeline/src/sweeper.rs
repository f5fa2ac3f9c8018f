//! Periodic maintenance of sessions and clip windows.
//!
//! Runs in every API process (unless disabled) and in the standalone
//! `sentinel-worker`. All sweep steps are safe to run concurrently from
//! several processes: each transition is a compare-and-set in the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sentinel_core::types::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::clip_recorder::ClipRecorder;
use crate::lifecycle::SessionLifecycleManager;

/// Counts from one sweep pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    pub idle_stopped: usize,
    pub windows_sealed: usize,
    pub stale_windows_discarded: usize,
    pub sessions_purged: u64,
}

pub struct Sweeper {
    lifecycle: Arc<SessionLifecycleManager>,
    clips: Arc<ClipRecorder>,
}

impl Sweeper {
    pub fn new(lifecycle: Arc<SessionLifecycleManager>, clips: Arc<ClipRecorder>) -> Self {
        Self { lifecycle, clips }
    }

    /// One pass. Each step's failure is logged and the remaining steps
    /// still run.
    pub async fn sweep_once(&self, now: Timestamp) -> SweepSummary {
        let mut summary = SweepSummary::default();

        match self.lifecycle.sweep_idle(now).await {
            Ok(stopped) => summary.idle_stopped = stopped.len(),
            Err(e) => tracing::error!(error = %e, "Sweep: idle session expiry failed"),
        }

        match self.clips.sweep_windows(now).await {
            Ok(sweep) => {
                summary.windows_sealed = sweep.sealed.len();
                summary.stale_windows_discarded = sweep.stale_discarded;
            }
            Err(e) => tracing::error!(error = %e, "Sweep: clip window sweep failed"),
        }

        match self.lifecycle.purge_expired(now).await {
            Ok(purged) => summary.sessions_purged = purged,
            Err(e) => tracing::error!(error = %e, "Sweep: session purge failed"),
        }

        if summary == SweepSummary::default() {
            tracing::debug!("Sweep: nothing to do");
        } else {
            tracing::info!(
                idle_stopped = summary.idle_stopped,
                windows_sealed = summary.windows_sealed,
                stale_windows_discarded = summary.stale_windows_discarded,
                sessions_purged = summary.sessions_purged,
                "Sweep completed",
            );
        }
        summary
    }

    /// Sweep every `interval` until `cancel` is triggered.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once(Utc::now()).await;
                }
            }
        }
    }
}
