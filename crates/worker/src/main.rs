use std::sync::Arc;
use std::time::Duration;

use sentinel_core::store::SharedStore;
use sentinel_db::PgStore;
use sentinel_pipeline::clip_recorder::ClipRecorder;
use sentinel_pipeline::lifecycle::SessionLifecycleManager;
use sentinel_pipeline::sweeper::Sweeper;
use sentinel_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_worker=debug,sentinel_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();

    // --- Shared store ---
    let pool = sentinel_db::create_pool(
        &config.database_url,
        config.max_connections,
        config.acquire_timeout,
    )
    .await
    .expect("Failed to connect to database");
    sentinel_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    let store: Arc<dyn SharedStore> = Arc::new(PgStore::new(pool));
    tracing::info!("Database ready");

    // --- Pipeline ---
    let storage = sentinel_cloud::connect(&config.clip_storage).await;
    let clips = Arc::new(ClipRecorder::new(
        Arc::clone(&store),
        storage,
        config.pipeline.clone(),
    ));
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        store,
        Arc::clone(&clips),
        config.pipeline.clone(),
    ));

    // --- Sweep until shutdown ---
    let cancel = CancellationToken::new();
    let sweeper = tokio::spawn(Sweeper::new(lifecycle, clips).run(config.sweep_interval, cancel.clone()));

    shutdown_signal().await;
    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(30), sweeper).await;
    tracing::info!("Worker stopped");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
