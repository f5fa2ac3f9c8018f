use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use sentinel_core::store::SessionStore;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the shared store answered a ping.
    pub store_healthy: bool,
    /// Whether this process has a detector installed.
    pub inference_ready: bool,
    /// Name of the installed detector, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
}

/// GET /health -- liveness plus store and inference readiness.
///
/// Always 200; a failing dependency shows up as `"degraded"`.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.store.ping().await.is_ok();
    let inference_ready = state.inference.is_ready();

    let status = if store_healthy && inference_ready {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        inference_ready,
        detector: state.inference.detector_name(),
    })
}

/// Mount health check routes at the root.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
