use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel_api::background::store_watchdog::{self, WatchdogExit};
use sentinel_api::bootstrap;
use sentinel_api::config::ServerConfig;
use sentinel_api::router::build_app_router;
use sentinel_inference::InferenceContext;
use sentinel_pipeline::sweeper::Sweeper;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sentinel_api=debug,sentinel_pipeline=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Shared store ---
    let store = bootstrap::connect_store(&config.store).await;

    // --- Clip storage ---
    let storage = sentinel_cloud::connect(&config.clip_storage).await;
    tracing::info!(backend = storage.name(), "Clip storage ready");

    // --- Inference ---
    let inference = Arc::new(InferenceContext::new(config.inference.timeout));
    match bootstrap::build_detector(&config.inference) {
        Some(detector) => inference.install(detector),
        None => tracing::warn!("INFERENCE_URL not set; sampled frames will be rejected with 503"),
    }

    // --- App state ---
    let state = bootstrap::build_state(config.clone(), Arc::clone(&store), storage, inference);

    // --- Background tasks ---
    let cancel = CancellationToken::new();

    let sweeper_handle = config.sweep_interval.map(|interval| {
        let sweeper = Sweeper::new(Arc::clone(&state.lifecycle), Arc::clone(&state.clips));
        tokio::spawn(sweeper.run(interval, cancel.clone()))
    });
    if sweeper_handle.is_none() {
        tracing::info!("In-process sweeping disabled (SWEEP_INTERVAL_SECS=0)");
    }

    let watchdog_handle = tokio::spawn(store_watchdog::run(
        Arc::clone(&store),
        config.store_failure_threshold,
        store_watchdog::DEFAULT_CHECK_INTERVAL,
        cancel.clone(),
    ));

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();

    if let Some(handle) = sweeper_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Session sweeper stopped");
    }

    let watchdog_exit = tokio::time::timeout(Duration::from_secs(5), watchdog_handle).await;
    if let Ok(Ok(WatchdogExit::Tripped)) = watchdog_exit {
        tracing::error!("Shut down by the store watchdog");
        std::process::exit(1);
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal (or an internal halt via `cancel`) to
/// initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal(cancel: CancellationToken) {
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
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
        _ = cancel.cancelled() => tracing::warn!("Internal shutdown requested"),
    }
}
