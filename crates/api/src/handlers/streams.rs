//! Handlers for the `/streams` resource.
//!
//! A stream session is created, fed frames, read back and stopped. Frames
//! arrive as base64-encoded images; every request may land on a different
//! worker process, so all state goes through the shared store.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sentinel_core::session::{SessionConfig, SessionStatus};
use sentinel_pipeline::clip_recorder::FlushReport;
use sentinel_pipeline::lifecycle::SessionView;
use sentinel_pipeline::processor::FrameReport;

use crate::error::AppResult;
use crate::extract::ApiJson;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /streams`.
///
/// Configuration fields sit at the top level next to `stream_id`; omitted
/// ones take the [`SessionConfig`] defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStreamRequest {
    /// Caller-chosen id; a UUID is assigned when absent.
    pub stream_id: Option<String>,
    pub frame_sample_rate: Option<u32>,
    pub min_confidence: Option<f64>,
    pub enable_clip_recording: Option<bool>,
    pub max_detections_per_frame: Option<u32>,
}

impl CreateStreamRequest {
    /// The requested configuration, defaults filled in. Range checks happen
    /// when the session is created.
    pub fn config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            frame_sample_rate: self.frame_sample_rate.unwrap_or(defaults.frame_sample_rate),
            min_confidence: self.min_confidence.unwrap_or(defaults.min_confidence),
            enable_clip_recording: self
                .enable_clip_recording
                .unwrap_or(defaults.enable_clip_recording),
            max_detections_per_frame: self
                .max_detections_per_frame
                .unwrap_or(defaults.max_detections_per_frame),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateStreamResponse {
    pub stream_id: String,
    pub status: SessionStatus,
    pub config: SessionConfig,
}

#[derive(Debug, Serialize)]
pub struct StopStreamResponse {
    pub stream_id: String,
    pub status: SessionStatus,
    /// Clip flushed because of this stop, if a window was recording.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<FlushReport>,
}

/// Body of `POST /streams/{id}/frames`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFrameRequest {
    /// At most `i64::MAX`; larger indexes are rejected.
    pub frame_index: u64,
    /// Base64-encoded PNG, JPEG or WebP image.
    pub frame: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /streams
pub async fn create_stream(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CreateStreamRequest>,
) -> AppResult<Json<CreateStreamResponse>> {
    let config = input.config();
    let session = state
        .lifecycle
        .create_session(input.stream_id, config, Utc::now())
        .await?;

    Ok(Json(CreateStreamResponse {
        stream_id: session.id,
        status: session.status,
        config: session.config,
    }))
}

/// GET /streams/{id}
pub async fn get_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<SessionView>> {
    let view = state.lifecycle.get_session(&id).await?;
    Ok(Json(view))
}

/// DELETE /streams/{id}
///
/// Idempotent: stopping a stopped session answers 200 again.
pub async fn stop_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<StopStreamResponse>> {
    let report = state.lifecycle.stop_session(&id, Utc::now()).await?;

    Ok(Json(StopStreamResponse {
        stream_id: report.session_id,
        status: report.status,
        clip: report.clip,
    }))
}

/// POST /streams/{id}/frames
pub async fn submit_frame(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<SubmitFrameRequest>,
) -> AppResult<Json<FrameReport>> {
    let report = state
        .processor
        .process(&id, input.frame_index, &input.frame)
        .await?;
    Ok(Json(report))
}
