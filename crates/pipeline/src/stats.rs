//! Aggregate statistics with graceful degradation.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use sentinel_core::stats::{StatsSnapshot, StoreAggregate};
use sentinel_core::store::{SessionStore, SharedStore};
use sentinel_inference::InferenceContext;

/// Reads aggregate counters from the store.
///
/// When the store cannot be read, the last good snapshot (or a zeroed one)
/// is served with `stale = true` instead of an error.
pub struct StatsCollector {
    store: Arc<dyn SharedStore>,
    inference: Arc<InferenceContext>,
    last_good: Mutex<Option<StatsSnapshot>>,
}

impl StatsCollector {
    pub fn new(store: Arc<dyn SharedStore>, inference: Arc<InferenceContext>) -> Self {
        Self {
            store,
            inference,
            last_good: Mutex::new(None),
        }
    }

    pub async fn stats(&self) -> StatsSnapshot {
        let inference_ready = self.inference.is_ready();

        match self.store.aggregate().await {
            Ok(aggregate) => {
                let snapshot = StatsSnapshot {
                    aggregate,
                    inference_ready,
                    generated_at: Utc::now(),
                    stale: false,
                };
                *self.cache() = Some(snapshot.clone());
                snapshot
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stats read failed; serving stale snapshot");
                match self.cache().clone() {
                    Some(previous) => StatsSnapshot {
                        inference_ready,
                        stale: true,
                        ..previous
                    },
                    None => StatsSnapshot {
                        aggregate: StoreAggregate::default(),
                        inference_ready,
                        generated_at: Utc::now(),
                        stale: true,
                    },
                }
            }
        }
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<StatsSnapshot>> {
        self.last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
