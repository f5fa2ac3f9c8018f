//! Halts the process when the shared store stays unreachable.
//!
//! A worker that cannot reach the store can neither admit frames nor take
//! clip leases, so it is better stopped and restarted by its supervisor
//! than left answering 503s.

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::store::{SessionStore, SharedStore};
use tokio_util::sync::CancellationToken;

/// How often the store is pinged.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Why the watchdog loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogExit {
    /// Shutdown was requested elsewhere.
    Cancelled,
    /// `threshold` consecutive pings failed; `cancel` has been triggered.
    Tripped,
}

/// Ping the store every `interval`. After `threshold` consecutive failures
/// the watchdog cancels `cancel`, which starts process shutdown.
pub async fn run(
    store: Arc<dyn SharedStore>,
    threshold: u32,
    interval: Duration,
    cancel: CancellationToken,
) -> WatchdogExit {
    let threshold = threshold.max(1);
    tracing::info!(
        threshold,
        interval_secs = interval.as_secs(),
        "Store watchdog started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Store watchdog stopping");
                return WatchdogExit::Cancelled;
            }
            _ = ticker.tick() => {
                match store.ping().await {
                    Ok(()) => {
                        if consecutive_failures > 0 {
                            tracing::info!(consecutive_failures, "Store reachable again");
                        }
                        consecutive_failures = 0;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        tracing::warn!(
                            error = %e,
                            consecutive_failures,
                            threshold,
                            "Store health check failed"
                        );
                        if consecutive_failures >= threshold {
                            tracing::error!(
                                consecutive_failures,
                                "Store unreachable, halting process"
                            );
                            cancel.cancel();
                            return WatchdogExit::Tripped;
                        }
                    }
                }
            }
        }
    }
}
