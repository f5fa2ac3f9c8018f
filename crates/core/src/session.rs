//! Stream session records, configuration, and validation.
//!
//! A session's configuration is fixed at creation. Counters and status are
//! mutated only through the atomic operations of the shared store.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default sampling rate: run inference on every 5th frame.
pub const DEFAULT_FRAME_SAMPLE_RATE: u32 = 5;

/// Default minimum confidence for a detection to be counted.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Default cap on accepted detections per sampled frame.
pub const DEFAULT_MAX_DETECTIONS_PER_FRAME: u32 = 100;

/// Maximum length of a session id.
const MAX_SESSION_ID_LEN: usize = 128;

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("valid session id regex"));

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "active" => Ok(SessionStatus::Active),
            "stopped" => Ok(SessionStatus::Stopped),
            other => Err(CoreError::Internal(format!(
                "Unknown session status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-session processing configuration.
///
/// Deserialization rejects unknown fields; omitted fields take the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Run inference on frames whose index is a multiple of this value.
    #[serde(default = "default_frame_sample_rate")]
    pub frame_sample_rate: u32,
    /// Detections below this confidence are dropped before counting.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Whether qualifying detections open clip-recording windows.
    #[serde(default)]
    pub enable_clip_recording: bool,
    /// Accepted detections per frame are truncated to this many.
    #[serde(default = "default_max_detections_per_frame")]
    pub max_detections_per_frame: u32,
}

fn default_frame_sample_rate() -> u32 {
    DEFAULT_FRAME_SAMPLE_RATE
}

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

fn default_max_detections_per_frame() -> u32 {
    DEFAULT_MAX_DETECTIONS_PER_FRAME
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            frame_sample_rate: DEFAULT_FRAME_SAMPLE_RATE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            enable_clip_recording: false,
            max_detections_per_frame: DEFAULT_MAX_DETECTIONS_PER_FRAME,
        }
    }
}

impl SessionConfig {
    /// Validate field ranges.
    ///
    /// Rules:
    /// - `frame_sample_rate >= 1`.
    /// - `min_confidence` is finite and within `0.0..=1.0`.
    /// - `max_detections_per_frame >= 1`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.frame_sample_rate < 1 {
            return Err(CoreError::Validation(
                "frame_sample_rate must be at least 1".to_string(),
            ));
        }
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoreError::Validation(format!(
                "min_confidence must be between 0 and 1, got {}",
                self.min_confidence
            )));
        }
        if self.max_detections_per_frame < 1 {
            return Err(CoreError::Validation(
                "max_detections_per_frame must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Session ids
// ---------------------------------------------------------------------------

/// Validate a caller-supplied session id.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_SESSION_ID_LEN` characters.
/// - Only ASCII alphanumerics and `_ . : -`.
pub fn validate_session_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::Validation(
            "stream_id must not be empty".to_string(),
        ));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(CoreError::Validation(format!(
            "stream_id must not exceed {MAX_SESSION_ID_LEN} characters"
        )));
    }
    if !SESSION_ID_RE.is_match(id) {
        return Err(CoreError::Validation(
            "stream_id may only contain alphanumeric, underscore, dot, colon, or hyphen characters"
                .to_string(),
        ));
    }
    Ok(())
}

/// Generate a server-assigned session id.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// A stream session as held by the shared store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamSession {
    pub id: String,
    pub config: SessionConfig,
    pub status: SessionStatus,
    /// Frames submitted, sampled or not.
    pub frame_count: u64,
    /// Frames that went through inference.
    pub sampled_count: u64,
    /// Accepted detections across all sampled frames.
    pub detection_count: u64,
    pub created_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub stopped_at: Option<Timestamp>,
    /// When a stopped session becomes eligible for removal.
    pub expires_at: Option<Timestamp>,
}

impl StreamSession {
    /// Build the initial record for a freshly created session.
    pub fn new(id: String, config: SessionConfig, now: Timestamp) -> Self {
        Self {
            id,
            config,
            status: SessionStatus::Active,
            frame_count: 0,
            sampled_count: 0,
            detection_count: 0,
            created_at: now,
            last_activity_at: now,
            stopped_at: None,
            expires_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
