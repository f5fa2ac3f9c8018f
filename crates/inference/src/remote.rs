//! HTTP client for a remote inference service.
//!
//! Protocol: `POST {base_url}/detect` with
//! `{"image": <base64>, "width": u32, "height": u32}`; the service answers
//! `{"detections": [{"class_name", "confidence", "bounding_box"}]}`.

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sentinel_core::detection::DetectionResult;
use sentinel_core::frame::Frame;

use crate::{Detector, InferenceError};

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: String,
    width: u32,
    height: u32,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<DetectionResult>,
}

/// Detector backed by an HTTP inference endpoint.
pub struct RemoteDetector {
    client: reqwest::Client,
    base_url: String,
    name: String,
}

impl RemoteDetector {
    /// * `base_url` - e.g. `http://inference:9000`; a trailing slash is ignored.
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            client,
            name: format!("remote:{base_url}"),
            base_url,
        }
    }

    /// Give the detector a friendlier name for logs.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl Detector for RemoteDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        let body = DetectRequest {
            image: base64::engine::general_purpose::STANDARD.encode(&frame.payload),
            width: frame.width,
            height: frame.height,
            content_type: frame.content_type(),
        };

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    InferenceError::Unavailable(e.to_string())
                } else {
                    InferenceError::Failed(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(InferenceError::Unavailable(format!(
                "{} answered 503",
                self.base_url
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Failed(format!(
                "inference service error ({}): {text}",
                status.as_u16()
            )));
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Failed(format!("malformed inference response: {e}")))?;
        Ok(parsed.detections)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
