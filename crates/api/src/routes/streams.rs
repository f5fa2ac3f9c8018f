use axum::routing::{get, post};
use axum::Router;

use crate::handlers::streams;
use crate::state::AppState;

/// Routes mounted at `/streams`.
///
/// ```text
/// POST   /                create_stream
/// GET    /{id}            get_stream
/// DELETE /{id}            stop_stream
/// POST   /{id}/frames     submit_frame
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(streams::create_stream))
        .route(
            "/{id}",
            get(streams::get_stream).delete(streams::stop_stream),
        )
        .route("/{id}/frames", post(streams::submit_frame))
}
