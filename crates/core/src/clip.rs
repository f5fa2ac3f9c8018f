//! Clip-recording windows and the policy that decides when they close.
//!
//! Windows move `recording -> flushing -> uploaded | discarded`. Only the
//! policy lives here; the state is held by the shared store and mutated
//! under a per-session lease by the pipeline's clip recorder.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default quiet period: a window closes after this long without a
/// qualifying detection.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(5);

/// Default hard cap on a window's duration.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

/// Default cap on frames held by one window.
pub const DEFAULT_MAX_FRAMES: u32 = 300;

// ---------------------------------------------------------------------------
// Window state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    /// Accepting frames.
    Recording,
    /// Sealed; the process that sealed it is uploading.
    Flushing,
    /// Upload succeeded.
    Uploaded,
    /// Empty on close, or upload attempts exhausted.
    Discarded,
}

impl WindowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowStatus::Recording => "recording",
            WindowStatus::Flushing => "flushing",
            WindowStatus::Uploaded => "uploaded",
            WindowStatus::Discarded => "discarded",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "recording" => Ok(WindowStatus::Recording),
            "flushing" => Ok(WindowStatus::Flushing),
            "uploaded" => Ok(WindowStatus::Uploaded),
            "discarded" => Ok(WindowStatus::Discarded),
            other => Err(CoreError::Internal(format!(
                "Unknown clip window status '{other}'"
            ))),
        }
    }
}

/// Why a window stopped accepting frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealReason {
    QuietPeriod,
    MaxDuration,
    MaxFrames,
    SessionStopped,
}

impl SealReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SealReason::QuietPeriod => "quiet_period",
            SealReason::MaxDuration => "max_duration",
            SealReason::MaxFrames => "max_frames",
            SealReason::SessionStopped => "session_stopped",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "quiet_period" => Ok(SealReason::QuietPeriod),
            "max_duration" => Ok(SealReason::MaxDuration),
            "max_frames" => Ok(SealReason::MaxFrames),
            "session_stopped" => Ok(SealReason::SessionStopped),
            other => Err(CoreError::Internal(format!("Unknown seal reason '{other}'"))),
        }
    }
}

/// A clip-recording window as held by the shared store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipWindow {
    pub id: String,
    pub session_id: String,
    pub status: WindowStatus,
    pub opened_at: Timestamp,
    pub last_detection_at: Timestamp,
    pub frame_count: u32,
    pub sealed_at: Option<Timestamp>,
    pub seal_reason: Option<SealReason>,
    pub object_key: Option<String>,
}

impl ClipWindow {
    /// A new window opened by a qualifying detection at `now`.
    pub fn open(session_id: &str, now: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            status: WindowStatus::Recording,
            opened_at: now,
            last_detection_at: now,
            frame_count: 0,
            sealed_at: None,
            seal_reason: None,
            object_key: None,
        }
    }
}

/// One buffered frame of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipFrame {
    pub frame_index: u64,
    pub captured_at: Timestamp,
    pub content_type: String,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Limits that close a recording window.
#[derive(Debug, Clone)]
pub struct ClipPolicy {
    pub quiet_period: Duration,
    pub max_duration: Duration,
    pub max_frames: u32,
}

impl Default for ClipPolicy {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            max_duration: DEFAULT_MAX_DURATION,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

impl ClipPolicy {
    /// Decide whether a recording window has expired by time at `now`.
    ///
    /// Max duration wins when both limits have passed. Timestamps in the
    /// future (clock skew between processes) count as zero elapsed.
    pub fn expiry(&self, window: &ClipWindow, now: Timestamp) -> Option<SealReason> {
        if elapsed(window.opened_at, now) >= self.max_duration {
            return Some(SealReason::MaxDuration);
        }
        if elapsed(window.last_detection_at, now) >= self.quiet_period {
            return Some(SealReason::QuietPeriod);
        }
        None
    }

    /// Whether a window holding `frame_count` frames is full.
    pub fn is_full(&self, frame_count: u32) -> bool {
        frame_count >= self.max_frames
    }
}

fn elapsed(since: Timestamp, now: Timestamp) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Object key for an uploaded clip:
/// `{prefix}/{session_id}/{opened_at:%Y%m%dT%H%M%SZ}-{window_id}.zip`.
pub fn clip_object_key(prefix: &str, window: &ClipWindow) -> String {
    let stamp = window.opened_at.format("%Y%m%dT%H%M%SZ");
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}/{stamp}-{}.zip", window.session_id, window.id)
    } else {
        format!("{prefix}/{}/{stamp}-{}.zip", window.session_id, window.id)
    }
}

/// Order frames for clip assembly: by frame index, ties by capture time.
///
/// Submission order is not meaningful across processes, so it is never used.
pub fn order_frames(frames: &mut [ClipFrame]) {
    frames.sort_by(|a, b| {
        a.frame_index
            .cmp(&b.frame_index)
            .then(a.captured_at.cmp(&b.captured_at))
    });
}
