//! Wiring shared by `main.rs` and the integration tests.

use std::sync::Arc;

use sentinel_cloud::ObjectStorage;
use sentinel_core::store::memory::MemoryStore;
use sentinel_core::store::SharedStore;
use sentinel_db::PgStore;
use sentinel_inference::cascade::{CascadeDetector, DecisionRules};
use sentinel_inference::remote::RemoteDetector;
use sentinel_inference::{Detector, InferenceContext};
use sentinel_pipeline::clip_recorder::ClipRecorder;
use sentinel_pipeline::lifecycle::SessionLifecycleManager;
use sentinel_pipeline::processor::FrameProcessor;
use sentinel_pipeline::stats::StatsCollector;

use crate::config::{InferenceConfig, ServerConfig, StoreBackend};
use crate::state::AppState;

/// Connect to the configured store. For Postgres this creates the pool,
/// checks connectivity and applies migrations.
///
/// Panics on failure; the process cannot serve anything without a store.
pub async fn connect_store(backend: &StoreBackend) -> Arc<dyn SharedStore> {
    match backend {
        StoreBackend::Postgres {
            database_url,
            max_connections,
            acquire_timeout,
        } => {
            let pool = sentinel_db::create_pool(database_url, *max_connections, *acquire_timeout)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            sentinel_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            sentinel_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; sessions are not shared between processes");
            Arc::new(MemoryStore::new())
        }
    }
}

/// The detector described by `config`, if any.
///
/// With only `url` set the remote detector is used directly. With
/// `specialist_url` as well, the remote at `url` annotates every frame
/// and the specialist is consulted for frames the decision rules select.
pub fn build_detector(config: &InferenceConfig) -> Option<Arc<dyn Detector>> {
    let url = config.url.as_deref()?;
    let primary: Arc<dyn Detector> = Arc::new(RemoteDetector::new(url));

    match config.specialist_url.as_deref() {
        Some(specialist_url) => {
            let specialist: Arc<dyn Detector> =
                Arc::new(RemoteDetector::new(specialist_url).named("specialist"));
            Some(Arc::new(CascadeDetector::new(
                primary,
                specialist,
                DecisionRules::default(),
            )))
        }
        None => Some(primary),
    }
}

/// Assemble the pipeline components and the handler state.
pub fn build_state(
    config: ServerConfig,
    store: Arc<dyn SharedStore>,
    storage: Arc<dyn ObjectStorage>,
    inference: Arc<InferenceContext>,
) -> AppState {
    let settings = config.pipeline.clone();

    let clips = Arc::new(ClipRecorder::new(
        Arc::clone(&store),
        storage,
        settings.clone(),
    ));
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&clips),
        settings.clone(),
    ));
    let processor = Arc::new(FrameProcessor::new(
        Arc::clone(&store),
        Arc::clone(&inference),
        Arc::clone(&clips),
        settings.history_cap,
    ));
    let stats = Arc::new(StatsCollector::new(Arc::clone(&store), Arc::clone(&inference)));

    AppState {
        store,
        inference,
        clips,
        lifecycle,
        processor,
        stats,
        config: Arc::new(config),
    }
}
