//! The per-frame path: decode, admit, sample, infer, aggregate, record.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sentinel_core::detection::DetectionResult;
use sentinel_core::error::CoreError;
use sentinel_core::frame::{decode_frame, Frame};
use sentinel_core::sampling::should_process;
use sentinel_core::session::StreamSession;
use sentinel_core::store::{FrameAdmission, SessionStore, SharedStore};
use sentinel_core::types::Timestamp;
use sentinel_inference::InferenceContext;

use crate::aggregator::DetectionAggregator;
use crate::clip_recorder::{ClipRecorder, ClipReport};
use crate::error::PipelineError;

/// Outcome of one submitted frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub stream_id: String,
    pub frame_index: u64,
    pub sampled: bool,
    /// Accepted detections; present for sampled frames only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<Vec<DetectionResult>>,
    /// Session total after this frame; present for sampled frames only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_count: Option<u64>,
    /// Set when inference failed and the frame was skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip: Option<ClipReport>,
    /// Set when the clip stage failed after the frame was counted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_error: Option<String>,
}

pub struct FrameProcessor {
    store: Arc<dyn SharedStore>,
    inference: Arc<InferenceContext>,
    aggregator: DetectionAggregator,
    clips: Arc<ClipRecorder>,
}

impl FrameProcessor {
    pub fn new(
        store: Arc<dyn SharedStore>,
        inference: Arc<InferenceContext>,
        clips: Arc<ClipRecorder>,
        history_cap: usize,
    ) -> Self {
        Self {
            aggregator: DetectionAggregator::new(Arc::clone(&store), history_cap),
            store,
            inference,
            clips,
        }
    }

    /// Process one frame of `stream_id`.
    ///
    /// Errors: `Validation` for a malformed payload, `NotFound` /
    /// `SessionStopped` for a session that cannot take frames,
    /// `InferenceUnavailable` when no detector can serve a sampled frame,
    /// and store failures before the frame is counted. An inference failure
    /// on a single frame is not an error: the frame counts as sampled with
    /// no detections. Neither is a clip-stage failure, which is reported in
    /// `clip_error`.
    pub async fn process(
        &self,
        stream_id: &str,
        frame_index: u64,
        encoded: &str,
    ) -> Result<FrameReport, PipelineError> {
        let frame = decode_frame(frame_index, encoded)?;
        let received_at = Utc::now();

        let session = match self.store.admit_frame(stream_id, received_at).await? {
            FrameAdmission::Admitted(session) => session,
            FrameAdmission::Stopped => {
                return Err(CoreError::SessionStopped(stream_id.to_string()).into())
            }
            FrameAdmission::NotFound => return Err(CoreError::session_not_found(stream_id).into()),
        };

        if !should_process(&session.config, frame_index) {
            let (clip, clip_error) = self.record_clip(&session, &frame, false, received_at).await;
            return Ok(FrameReport {
                stream_id: session.id,
                frame_index,
                sampled: false,
                detections: None,
                detection_count: None,
                inference_error: None,
                clip,
                clip_error,
            });
        }

        let started = Instant::now();
        let (detections, inference_error) = match self.inference.detect(&frame).await {
            Ok(detections) => (detections, None),
            Err(e) if e.is_unavailable() => {
                return Err(PipelineError::InferenceUnavailable(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    frame_index,
                    error = %e,
                    "Inference failed; frame skipped",
                );
                (Vec::new(), Some(e.to_string()))
            }
        };
        let inference_ms = started.elapsed().as_millis() as u64;
        let raw_count = detections.len();

        let delta = self
            .aggregator
            .record(&session, frame_index, detections, Utc::now())
            .await?;

        tracing::info!(
            target: "sentinel::metrics",
            session_id = %session.id,
            frame_index,
            inference_ms,
            raw_detections = raw_count,
            accepted_detections = delta.accepted.len(),
            inference_failed = inference_error.is_some(),
            "frame_processed",
        );

        let qualifying = !delta.accepted.is_empty();
        let (clip, clip_error) = self
            .record_clip(&session, &frame, qualifying, received_at)
            .await;

        Ok(FrameReport {
            stream_id: session.id,
            frame_index,
            sampled: true,
            detections: Some(delta.accepted),
            detection_count: Some(delta.detection_count),
            inference_error,
            clip,
            clip_error,
        })
    }

    /// Run the clip stage for an admitted frame.
    ///
    /// The frame is already counted by now, so a lease or store failure
    /// here is reported rather than returned; failing the request would
    /// invite a retry that counts the frame again.
    async fn record_clip(
        &self,
        session: &StreamSession,
        frame: &Frame,
        qualifying: bool,
        received_at: Timestamp,
    ) -> (Option<ClipReport>, Option<String>) {
        match self
            .clips
            .on_frame(session, frame, qualifying, received_at)
            .await
        {
            Ok(report) => ((!report.is_empty()).then_some(report), None),
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    frame_index = frame.index,
                    qualifying,
                    error = %e,
                    "Clip recording failed for counted frame",
                );
                (None, Some(e.to_string()))
            }
        }
    }
}
