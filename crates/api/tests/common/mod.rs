//! Shared helpers for API integration tests.
//!
//! The app is built over `MemoryStore` and `MemoryStorage` so the full
//! router and middleware stack can be exercised without Postgres or S3.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use base64::Engine;
use http_body_util::BodyExt;
use sentinel_api::bootstrap::build_state;
use sentinel_api::config::{InferenceConfig, ServerConfig, StoreBackend};
use sentinel_api::router::build_app_router;
use sentinel_cloud::memory::MemoryStorage;
use sentinel_cloud::StorageBackend;
use sentinel_core::detection::{BoundingBox, DetectionResult};
use sentinel_core::frame::Frame;
use sentinel_core::store::memory::MemoryStore;
use sentinel_inference::{Detector, InferenceContext, InferenceError};
use sentinel_pipeline::PipelineSettings;
use tower::ServiceExt;

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default),
/// the in-memory store, and fast upload retries.
pub fn test_config() -> ServerConfig {
    let mut pipeline = PipelineSettings::default();
    pipeline.upload_retry.initial_delay = Duration::from_millis(1);
    pipeline.upload_retry.max_delay = Duration::from_millis(5);

    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_body_bytes: 1024 * 1024,
        store: StoreBackend::Memory,
        clip_storage: StorageBackend::Memory,
        inference: InferenceConfig {
            url: None,
            specialist_url: None,
            timeout: Duration::from_secs(5),
        },
        pipeline,
        sweep_interval: None,
        store_failure_threshold: 5,
    }
}

/// The router plus handles on its in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub memory: Arc<MemoryStore>,
    pub storage: Arc<MemoryStorage>,
    pub inference: Arc<InferenceContext>,
}

/// Build the full application router with all middleware layers, using
/// `detector` as this process's detector (none means inference is
/// unavailable).
pub fn build_test_app(detector: Option<Arc<dyn Detector>>) -> TestApp {
    let config = test_config();
    let memory = Arc::new(MemoryStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let inference = Arc::new(InferenceContext::new(config.inference.timeout));
    if let Some(detector) = detector {
        inference.install(detector);
    }

    let state = build_state(
        config.clone(),
        memory.clone(),
        storage.clone(),
        Arc::clone(&inference),
    );

    TestApp {
        router: build_app_router(state, &config),
        memory,
        storage,
        inference,
    }
}

/// A test app whose detector returns one confident person per frame.
pub fn app_with_person_detector() -> TestApp {
    build_test_app(Some(Arc::new(FixedDetector(vec![detection("person", 0.9)]))))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: &TestApp, request: Request<Body>) -> Response<Body> {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: &TestApp, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Create a session with the config fields of `config` (a JSON object)
/// and assert it succeeded.
pub async fn create_stream(app: &TestApp, id: &str, config: serde_json::Value) {
    let mut body = config;
    body["stream_id"] = serde_json::json!(id);
    let response = post_json(app, "/streams", body).await;
    assert_eq!(response.status(), 200, "creating {id}");
}

pub async fn submit_frame(app: &TestApp, id: &str, frame_index: u64) -> Response<Body> {
    post_json(
        app,
        &format!("/streams/{id}/frames"),
        serde_json::json!({ "frame_index": frame_index, "frame": png_b64(120, 120) }),
    )
    .await
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

pub fn detection(class_name: &str, confidence: f64) -> DetectionResult {
    DetectionResult::new(
        class_name,
        confidence,
        BoundingBox { x1: 4.0, y1: 4.0, x2: 40.0, y2: 40.0 },
    )
}

/// Returns the same detections for every frame.
pub struct FixedDetector(pub Vec<DetectionResult>);

#[async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// A valid PNG frame, base64 encoded.
pub fn png_b64(width: u32, height: u32) -> String {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(out.into_inner())
}
