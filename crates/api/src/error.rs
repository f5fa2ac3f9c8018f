use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentinel_core::error::CoreError;
use sentinel_pipeline::PipelineError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`PipelineError`] for domain errors and adds
/// HTTP-specific variants. Implements [`IntoResponse`] to produce
/// consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `sentinel_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An error from the frame-processing pipeline.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),

            AppError::Pipeline(err) => match err {
                PipelineError::Core(core) => classify_core_error(core),
                PipelineError::Store(store) => {
                    tracing::error!(error = %store, "Shared store failure");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "COORDINATION_UNAVAILABLE",
                        "The shared session store is unavailable".to_string(),
                    )
                }
                PipelineError::LockTimeout { key, waited } => {
                    tracing::warn!(key = %key, waited_ms = waited.as_millis() as u64, "Lease wait timed out");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "COORDINATION_UNAVAILABLE",
                        "Timed out waiting for the clip lock".to_string(),
                    )
                }
                PipelineError::InferenceUnavailable(msg) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INFERENCE_UNAVAILABLE",
                    msg.clone(),
                ),
                PipelineError::Archive(msg) => {
                    tracing::error!(error = %msg, "Clip archive error");
                    internal()
                }
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::SessionStopped(id) => (
            StatusCode::CONFLICT,
            "SESSION_STOPPED",
            format!("Stream session {id} is stopped"),
        ),
        CoreError::Coordination(msg) => {
            tracing::error!(error = %msg, "Coordination failure");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "COORDINATION_UNAVAILABLE",
                "Coordination with other workers failed".to_string(),
            )
        }
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
