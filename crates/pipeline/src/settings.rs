use std::time::Duration;

use sentinel_core::clip::ClipPolicy;
use sentinel_core::detection::DEFAULT_HISTORY_CAP;
use sentinel_core::retry::RetryPolicy;

use crate::lease::LeaseConfig;

/// Default idle time after which an active session is stopped (24 hours).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(86_400);

/// Default time a stopped session stays readable before it is purged.
pub const DEFAULT_STOPPED_RETENTION: Duration = Duration::from_secs(300);

/// Default age after which a window still `flushing` is presumed orphaned.
pub const DEFAULT_STALE_FLUSH_AFTER: Duration = Duration::from_secs(600);

/// Default object key prefix for clips.
pub const DEFAULT_CLIP_PREFIX: &str = "clips";

/// Tunables shared by the pipeline components.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub session_ttl: Duration,
    pub stopped_retention: Duration,
    pub history_cap: usize,
    pub clip_policy: ClipPolicy,
    pub clip_lease: LeaseConfig,
    pub upload_retry: RetryPolicy,
    pub clip_prefix: String,
    pub stale_flush_after: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            stopped_retention: DEFAULT_STOPPED_RETENTION,
            history_cap: DEFAULT_HISTORY_CAP,
            clip_policy: ClipPolicy::default(),
            clip_lease: LeaseConfig::default(),
            upload_retry: RetryPolicy::default(),
            clip_prefix: DEFAULT_CLIP_PREFIX.to_string(),
            stale_flush_after: DEFAULT_STALE_FLUSH_AFTER,
        }
    }
}

impl PipelineSettings {
    /// Load settings from environment variables, falling back to the
    /// defaults above.
    ///
    /// | Env Var                  | Default  |
    /// |--------------------------|----------|
    /// | `SESSION_TTL_SECS`       | `86400`  |
    /// | `STOPPED_RETENTION_SECS` | `300`    |
    /// | `DETECTION_HISTORY_CAP`  | `50`     |
    /// | `CLIP_QUIET_PERIOD_SECS` | `5`      |
    /// | `CLIP_MAX_DURATION_SECS` | `30`     |
    /// | `CLIP_MAX_FRAMES`        | `300`    |
    /// | `CLIP_LOCK_LEASE_SECS`   | `10`     |
    /// | `CLIP_LOCK_TIMEOUT_MS`   | `2000`   |
    /// | `CLIP_UPLOAD_ATTEMPTS`   | `3`      |
    /// | `CLIP_UPLOAD_BACKOFF_MS` | `200`    |
    /// | `CLIP_PREFIX`            | `clips`  |
    /// | `CLIP_STALE_FLUSH_SECS`  | `600`    |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let history_cap: usize = std::env::var("DETECTION_HISTORY_CAP")
            .unwrap_or_else(|_| defaults.history_cap.to_string())
            .parse()
            .expect("DETECTION_HISTORY_CAP must be a valid usize");

        let clip_policy = ClipPolicy {
            quiet_period: secs_var("CLIP_QUIET_PERIOD_SECS", defaults.clip_policy.quiet_period),
            max_duration: secs_var("CLIP_MAX_DURATION_SECS", defaults.clip_policy.max_duration),
            max_frames: std::env::var("CLIP_MAX_FRAMES")
                .unwrap_or_else(|_| defaults.clip_policy.max_frames.to_string())
                .parse()
                .expect("CLIP_MAX_FRAMES must be a valid u32"),
        };
        assert!(clip_policy.max_frames >= 1, "CLIP_MAX_FRAMES must be at least 1");

        let clip_lease = LeaseConfig {
            lease: secs_var("CLIP_LOCK_LEASE_SECS", defaults.clip_lease.lease),
            acquire_timeout: millis_var("CLIP_LOCK_TIMEOUT_MS", defaults.clip_lease.acquire_timeout),
            ..defaults.clip_lease
        };

        let upload_retry = RetryPolicy {
            max_attempts: std::env::var("CLIP_UPLOAD_ATTEMPTS")
                .unwrap_or_else(|_| defaults.upload_retry.max_attempts.to_string())
                .parse()
                .expect("CLIP_UPLOAD_ATTEMPTS must be a valid u32"),
            initial_delay: millis_var("CLIP_UPLOAD_BACKOFF_MS", defaults.upload_retry.initial_delay),
            ..defaults.upload_retry
        };

        let clip_prefix = std::env::var("CLIP_PREFIX")
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or(defaults.clip_prefix);

        Self {
            session_ttl: secs_var("SESSION_TTL_SECS", defaults.session_ttl),
            stopped_retention: secs_var("STOPPED_RETENTION_SECS", defaults.stopped_retention),
            history_cap,
            clip_policy,
            clip_lease,
            upload_retry,
            clip_prefix,
            stale_flush_after: secs_var("CLIP_STALE_FLUSH_SECS", defaults.stale_flush_after),
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    let secs: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.as_secs().to_string())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a whole number of seconds: {e}"));
    Duration::from_secs(secs)
}

fn millis_var(name: &str, default: Duration) -> Duration {
    let ms: u64 = std::env::var(name)
        .unwrap_or_else(|_| default.as_millis().to_string())
        .parse()
        .unwrap_or_else(|e| panic!("{name} must be a whole number of milliseconds: {e}"));
    Duration::from_millis(ms)
}

/// Convert a std duration for timestamp arithmetic. Out-of-range values
/// are clamped to a century.
pub(crate) fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| chrono::Duration::days(36_500))
        .min(chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrono_duration_clamps_to_a_century() {
        assert_eq!(chrono_duration(Duration::from_secs(300)), chrono::Duration::seconds(300));
        assert_eq!(chrono_duration(Duration::MAX), chrono::Duration::days(36_500));
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.session_ttl, Duration::from_secs(86_400));
        assert_eq!(settings.stopped_retention, Duration::from_secs(300));
        assert_eq!(settings.history_cap, 50);
        assert_eq!(settings.clip_policy.max_frames, 300);
        assert_eq!(settings.clip_lease.acquire_timeout, Duration::from_millis(2000));
        assert_eq!(settings.upload_retry.max_attempts, 3);
        assert_eq!(settings.clip_prefix, "clips");
    }
}
