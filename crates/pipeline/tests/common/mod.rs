//! Shared harness for pipeline integration tests.
//!
//! Concurrent tokio tasks over one `MemoryStore` stand in for worker
//! processes sharing the store.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use sentinel_cloud::memory::MemoryStorage;
use sentinel_cloud::{ObjectStorage, StorageError};
use sentinel_core::detection::{BoundingBox, DetectionResult};
use sentinel_core::frame::Frame;
use sentinel_core::store::memory::MemoryStore;
use sentinel_core::store::SharedStore;
use sentinel_inference::{Detector, InferenceContext, InferenceError};
use sentinel_pipeline::clip_recorder::ClipRecorder;
use sentinel_pipeline::lifecycle::SessionLifecycleManager;
use sentinel_pipeline::processor::FrameProcessor;
use sentinel_pipeline::sweeper::Sweeper;
use sentinel_pipeline::PipelineSettings;
use tokio::sync::Semaphore;

pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub store: Arc<dyn SharedStore>,
    pub storage: Arc<MemoryStorage>,
    pub inference: Arc<InferenceContext>,
    pub clips: Arc<ClipRecorder>,
    pub lifecycle: Arc<SessionLifecycleManager>,
    pub processor: Arc<FrameProcessor>,
}

impl Harness {
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(Arc::clone(&self.lifecycle), Arc::clone(&self.clips))
    }
}

/// Settings with fast retries so failing uploads do not slow tests down.
pub fn test_settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.upload_retry.initial_delay = Duration::from_millis(1);
    settings.upload_retry.max_delay = Duration::from_millis(5);
    settings
}

pub fn harness(settings: PipelineSettings, detector: Option<Arc<dyn Detector>>) -> Harness {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn SharedStore> = memory.clone();
    let storage = Arc::new(MemoryStorage::new());
    let inference = Arc::new(InferenceContext::new(Duration::from_secs(5)));
    if let Some(detector) = detector {
        inference.install(detector);
    }

    let clips = Arc::new(ClipRecorder::new(
        Arc::clone(&store),
        storage.clone(),
        settings.clone(),
    ));
    let lifecycle = Arc::new(SessionLifecycleManager::new(
        Arc::clone(&store),
        Arc::clone(&clips),
        settings.clone(),
    ));
    let processor = Arc::new(FrameProcessor::new(
        Arc::clone(&store),
        Arc::clone(&inference),
        Arc::clone(&clips),
        settings.history_cap,
    ));

    Harness {
        memory,
        store,
        storage,
        inference,
        clips,
        lifecycle,
        processor,
    }
}

pub fn detection(class_name: &str, confidence: f64) -> DetectionResult {
    DetectionResult::new(
        class_name,
        confidence,
        BoundingBox { x1: 10.0, y1: 10.0, x2: 60.0, y2: 90.0 },
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

/// Returns detections scripted per frame index; other frames get none.
pub struct ScriptedDetector(pub HashMap<u64, Vec<DetectionResult>>);

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        Ok(self.0.get(&frame.index).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fails every call with the given error kind.
pub struct FailingDetector {
    pub unavailable: bool,
}

#[async_trait]
impl Detector for FailingDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<DetectionResult>, InferenceError> {
        if self.unavailable {
            Err(InferenceError::Unavailable("backend down".into()))
        } else {
            Err(InferenceError::Failed("model error".into()))
        }
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Holds every write until [`GatedStorage::open`], then stores it in
/// `inner`.
pub struct GatedStorage {
    pub inner: MemoryStorage,
    gate: Semaphore,
}

impl GatedStorage {
    pub fn new() -> Self {
        Self {
            inner: MemoryStorage::new(),
            gate: Semaphore::new(0),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(1024);
    }
}

#[async_trait]
impl ObjectStorage for GatedStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        self.inner.put_object(key, body, content_type).await
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// A valid PNG frame, base64 encoded.
pub fn png_b64(width: u32, height: u32) -> String {
    let img = image::DynamicImage::new_rgb8(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    base64::engine::general_purpose::STANDARD.encode(out.into_inner())
}

/// The decoded form of [`png_b64`], for driving the recorder directly.
pub fn png_frame(index: u64) -> Frame {
    sentinel_core::frame::decode_frame(index, &png_b64(120, 120)).unwrap()
}
