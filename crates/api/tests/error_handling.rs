//! Tests for `AppError` → HTTP response mapping.
//!
//! These call `IntoResponse` directly on `AppError` values; no router is
//! involved.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use sentinel_api::error::AppError;
use sentinel_core::error::CoreError;
use sentinel_core::store::StoreError;
use sentinel_pipeline::PipelineError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn not_found_error_returns_404() {
    let (status, json) = error_to_response(CoreError::session_not_found("cam-1").into()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "StreamSession with id cam-1 not found");
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("frame_sample_rate must be at least 1".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "frame_sample_rate must be at least 1");
}

#[tokio::test]
async fn conflict_error_returns_409() {
    let err = AppError::Core(CoreError::Conflict("already active".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn session_stopped_returns_409_with_its_own_code() {
    let err = AppError::Pipeline(PipelineError::Core(CoreError::SessionStopped("cam-1".into())));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "SESSION_STOPPED");
}

// ---------------------------------------------------------------------------
// Availability errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inference_unavailable_returns_503() {
    let err = AppError::Pipeline(PipelineError::InferenceUnavailable("no detector".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "INFERENCE_UNAVAILABLE");
}

#[tokio::test]
async fn store_and_lease_failures_fail_closed_with_503() {
    let store = AppError::Pipeline(PipelineError::Store(StoreError::Unavailable(
        "connection refused at 10.0.0.5".into(),
    )));
    let (status, json) = error_to_response(store).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "COORDINATION_UNAVAILABLE");
    assert!(!json["error"].as_str().unwrap().contains("10.0.0.5"));

    let lease = AppError::Pipeline(PipelineError::LockTimeout {
        key: "clip:cam-1".into(),
        waited: Duration::from_secs(2),
    });
    let (status, json) = error_to_response(lease).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "COORDINATION_UNAVAILABLE");
}

// ---------------------------------------------------------------------------
// Internal errors are sanitised
// ---------------------------------------------------------------------------

#[tokio::test]
async fn internal_error_hides_details() {
    let err = AppError::InternalError("secret path /var/lib/x".into());
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn archive_error_hides_details() {
    let err = AppError::Pipeline(PipelineError::Archive("zip writer failed".into()));
    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("bad body".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "bad body");
}
