use std::time::Duration;

use sentinel_cloud::StorageBackend;
use sentinel_pipeline::PipelineSettings;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub sweep_interval: Duration,
    pub clip_storage: StorageBackend,
    pub pipeline: PipelineSettings,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default   |
    /// |----------------------------------|-----------|
    /// | `DATABASE_URL`                   | required  |
    /// | `DATABASE_MAX_CONNECTIONS`       | `4`       |
    /// | `DATABASE_ACQUIRE_TIMEOUT_SECS`  | `3`       |
    /// | `SWEEP_INTERVAL_SECS`            | `30`      |
    ///
    /// Clip storage and pipeline tunables use the same variables as the
    /// API server.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("DATABASE_MAX_CONNECTIONS must be a valid u32");

        let acquire_timeout_secs: u64 = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("DATABASE_ACQUIRE_TIMEOUT_SECS must be a valid u64");

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");
        assert!(sweep_interval_secs > 0, "SWEEP_INTERVAL_SECS must be at least 1 for the worker");

        Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            clip_storage: StorageBackend::from_env(),
            pipeline: PipelineSettings::from_env(),
        }
    }
}
