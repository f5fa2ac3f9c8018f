pub mod health;
pub mod stats;
pub mod streams;

use axum::Router;

use crate::state::AppState;

/// Build the stream and stats routes.
///
/// Route tree:
/// ```text
/// /streams                       create
/// /streams/{id}                  get, stop
/// /streams/{id}/frames           submit frame
/// /stats                         aggregate statistics
/// ```
///
/// Health lives in [`health::router`] and is merged separately.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/streams", streams::router())
        .merge(stats::router())
}
