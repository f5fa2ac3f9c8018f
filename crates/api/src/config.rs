use std::time::Duration;

use sentinel_cloud::StorageBackend;
use sentinel_inference::context::DEFAULT_INFERENCE_TIMEOUT;
use sentinel_pipeline::PipelineSettings;

/// Default cap on request bodies (16 MiB); frames arrive base64-encoded.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Where session state lives.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    /// Shared Postgres database; required when more than one process runs.
    Postgres {
        database_url: String,
        max_connections: u32,
        acquire_timeout: Duration,
    },
    /// Process-local state for single-process development.
    Memory,
}

/// How this process serves inference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceConfig {
    /// Remote detector endpoint. Unset means inference is unavailable.
    pub url: Option<String>,
    /// Optional second-stage detector; enables the annotate/specialist cascade.
    pub specialist_url: Option<String>,
    pub timeout: Duration,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes.
    pub max_body_bytes: usize,
    pub store: StoreBackend,
    pub clip_storage: StorageBackend,
    pub inference: InferenceConfig,
    pub pipeline: PipelineSettings,
    /// Interval of the in-process sweep; `None` disables it.
    pub sweep_interval: Option<Duration>,
    /// Consecutive failed store health checks before the process halts.
    pub store_failure_threshold: u32,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                    |
    /// |----------------------------------|----------------------------|
    /// | `HOST`                           | `0.0.0.0`                  |
    /// | `PORT`                           | `8080`                     |
    /// | `CORS_ORIGINS`                   | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`           | `30`                       |
    /// | `MAX_BODY_BYTES`                 | `16777216`                 |
    /// | `STORE_BACKEND`                  | `postgres`                 |
    /// | `DATABASE_URL`                   | required for `postgres`    |
    /// | `DATABASE_MAX_CONNECTIONS`       | `10`                       |
    /// | `DATABASE_ACQUIRE_TIMEOUT_SECS`  | `3`                        |
    /// | `INFERENCE_URL`                  | unset                      |
    /// | `INFERENCE_SPECIALIST_URL`       | unset                      |
    /// | `INFERENCE_TIMEOUT_SECS`         | `10`                       |
    /// | `SWEEP_INTERVAL_SECS`            | `30` (`0` disables)        |
    /// | `STORE_FAILURE_THRESHOLD`        | `5`                        |
    ///
    /// Pipeline tunables are read by [`PipelineSettings::from_env`] and clip
    /// storage by [`StorageBackend::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_body_bytes: usize = std::env::var("MAX_BODY_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_BODY_BYTES.to_string())
            .parse()
            .expect("MAX_BODY_BYTES must be a valid usize");

        let inference_timeout_secs: u64 = std::env::var("INFERENCE_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_INFERENCE_TIMEOUT.as_secs().to_string())
            .parse()
            .expect("INFERENCE_TIMEOUT_SECS must be a valid u64");

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");

        let store_failure_threshold: u32 = std::env::var("STORE_FAILURE_THRESHOLD")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("STORE_FAILURE_THRESHOLD must be a valid u32");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_body_bytes,
            store: StoreBackend::from_env(),
            clip_storage: StorageBackend::from_env(),
            inference: InferenceConfig {
                url: non_empty_var("INFERENCE_URL"),
                specialist_url: non_empty_var("INFERENCE_SPECIALIST_URL"),
                timeout: Duration::from_secs(inference_timeout_secs),
            },
            pipeline: PipelineSettings::from_env(),
            sweep_interval: (sweep_interval_secs > 0)
                .then(|| Duration::from_secs(sweep_interval_secs)),
            store_failure_threshold: store_failure_threshold.max(1),
        }
    }
}

impl StoreBackend {
    /// Read `STORE_BACKEND` and, for Postgres, the connection settings.
    pub fn from_env() -> Self {
        let kind = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".into());
        match kind.trim() {
            "postgres" => Self::postgres_from_env(),
            "memory" => StoreBackend::Memory,
            other => panic!("Unknown STORE_BACKEND '{other}'. Must be one of: postgres, memory"),
        }
    }

    /// Postgres settings; `DATABASE_URL` is required.
    pub fn postgres_from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("DATABASE_MAX_CONNECTIONS must be a valid u32");

        let acquire_timeout_secs: u64 = std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("DATABASE_ACQUIRE_TIMEOUT_SECS must be a valid u64");

        StoreBackend::Postgres {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
