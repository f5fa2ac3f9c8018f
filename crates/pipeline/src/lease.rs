//! Lease-based advisory locks over the shared store.
//!
//! A lease is held by a random holder token and expires on its own after
//! the lease duration, so a process that dies while holding one blocks
//! others for at most that long. Acquisition polls until a deadline.

use std::sync::Arc;
use std::time::Duration;

use sentinel_core::store::{LeaseStore, SharedStore};
use tokio::time::Instant;

use crate::error::PipelineError;

/// Default lease duration.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(10);

/// Default time to wait for a contended lease.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default pause between acquisition attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    pub lease: Duration,
    pub acquire_timeout: Duration,
    pub retry_interval: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Lock key serialising clip-window mutations of one session.
pub fn clip_lock_key(session_id: &str) -> String {
    format!("clip:{session_id}")
}

/// Acquire `key`, polling until `config.acquire_timeout` elapses.
pub async fn acquire(
    store: &Arc<dyn SharedStore>,
    key: &str,
    config: &LeaseConfig,
) -> Result<LeaseGuard, PipelineError> {
    let holder = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();
    let deadline = started + config.acquire_timeout;

    loop {
        if store.try_acquire(key, &holder, config.lease).await? {
            return Ok(LeaseGuard {
                store: Arc::clone(store),
                key: key.to_string(),
                holder,
                released: false,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PipelineError::LockTimeout {
                key: key.to_string(),
                waited: now - started,
            });
        }
        tokio::time::sleep(config.retry_interval.min(deadline - now)).await;
    }
}

/// A held lease.
///
/// Call [`LeaseGuard::release`] on every path. A guard dropped without it
/// (early return, cancelled request) schedules the release on the runtime.
pub struct LeaseGuard {
    store: Arc<dyn SharedStore>,
    key: String,
    holder: String,
    released: bool,
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LeaseGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lease. Failures are logged; the lease then expires on
    /// its own.
    pub async fn release(mut self) {
        self.released = true;
        match self.store.release(&self.key, &self.holder).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %self.key, "Lease expired before release");
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Lease release failed");
            }
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let holder = std::mem::take(&mut self.holder);
        handle.spawn(async move {
            if let Err(e) = store.release(&key, &holder).await {
                tracing::warn!(key = %key, error = %e, "Deferred lease release failed");
            }
        });
    }
}
