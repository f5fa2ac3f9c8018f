use std::sync::Arc;

use sentinel_core::store::SharedStore;
use sentinel_inference::InferenceContext;
use sentinel_pipeline::clip_recorder::ClipRecorder;
use sentinel_pipeline::lifecycle::SessionLifecycleManager;
use sentinel_pipeline::processor::FrameProcessor;
use sentinel_pipeline::stats::StatsCollector;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Shared session store (Postgres, or memory in development).
    pub store: Arc<dyn SharedStore>,
    /// Detector installed in this process.
    pub inference: Arc<InferenceContext>,
    pub clips: Arc<ClipRecorder>,
    pub lifecycle: Arc<SessionLifecycleManager>,
    pub processor: Arc<FrameProcessor>,
    pub stats: Arc<StatsCollector>,
    pub config: Arc<ServerConfig>,
}
