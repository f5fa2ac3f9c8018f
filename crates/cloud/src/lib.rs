//! Object storage for finished clip archives.
//!
//! Clips are written once under a deterministic key and never read back by
//! the service, so the [`ObjectStorage`] contract is a single `put`.
//! Backends: S3 ([`s3::S3Storage`]), a local directory
//! ([`local::LocalStorage`]) and process memory ([`memory::MemoryStorage`]).

pub mod local;
pub mod memory;
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

/// Errors from an object storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// The backend refused or failed the write.
    #[error("Storage write failed: {0}")]
    Write(String),

    /// The key cannot be stored by this backend.
    #[error("Invalid object key '{0}'")]
    InvalidKey(String),
}

/// Write-only object store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Which backend clips are written to.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    S3 { bucket: String },
    Local { root: PathBuf },
    Memory,
}

impl StorageBackend {
    /// Parse a `CLIP_STORAGE` value. `bucket` is required for `s3`.
    pub fn from_parts(
        kind: &str,
        bucket: Option<String>,
        local_dir: PathBuf,
    ) -> Result<Self, String> {
        match kind {
            "s3" => bucket
                .filter(|b| !b.trim().is_empty())
                .map(|bucket| StorageBackend::S3 { bucket })
                .ok_or_else(|| "CLIP_BUCKET must be set when CLIP_STORAGE=s3".to_string()),
            "local" => Ok(StorageBackend::Local { root: local_dir }),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!(
                "Unknown CLIP_STORAGE '{other}'. Must be one of: s3, local, memory"
            )),
        }
    }
}

impl StorageBackend {
    /// Read the backend from the environment.
    ///
    /// | Env Var          | Default          |
    /// |------------------|------------------|
    /// | `CLIP_STORAGE`   | `local`          |
    /// | `CLIP_BUCKET`    | (none)           |
    /// | `CLIP_LOCAL_DIR` | `storage/clips`  |
    ///
    /// Panics on an unknown kind or a missing bucket.
    pub fn from_env() -> Self {
        let kind = std::env::var("CLIP_STORAGE").unwrap_or_else(|_| "local".into());
        let bucket = std::env::var("CLIP_BUCKET").ok();
        let local_dir = std::env::var("CLIP_LOCAL_DIR").unwrap_or_else(|_| "storage/clips".into());

        Self::from_parts(kind.trim(), bucket, PathBuf::from(local_dir))
            .unwrap_or_else(|e| panic!("{e}"))
    }
}

/// Build the configured backend. S3 credentials and region come from the
/// standard AWS environment.
pub async fn connect(backend: &StorageBackend) -> Arc<dyn ObjectStorage> {
    match backend {
        StorageBackend::S3 { bucket } => Arc::new(s3::S3Storage::from_env(bucket.clone()).await),
        StorageBackend::Local { root } => Arc::new(local::LocalStorage::new(root.clone())),
        StorageBackend::Memory => Arc::new(memory::MemoryStorage::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backends() {
        let dir = PathBuf::from("storage/clips");
        assert_eq!(
            StorageBackend::from_parts("s3", Some("clips-bucket".into()), dir.clone()),
            Ok(StorageBackend::S3 {
                bucket: "clips-bucket".into()
            })
        );
        assert_eq!(
            StorageBackend::from_parts("local", None, dir.clone()),
            Ok(StorageBackend::Local { root: dir.clone() })
        );
        assert_eq!(
            StorageBackend::from_parts("memory", None, dir.clone()),
            Ok(StorageBackend::Memory)
        );
    }

    #[test]
    fn s3_requires_bucket() {
        let dir = PathBuf::from("storage/clips");
        assert!(StorageBackend::from_parts("s3", None, dir.clone()).is_err());
        assert!(StorageBackend::from_parts("s3", Some("  ".into()), dir.clone()).is_err());
        assert!(StorageBackend::from_parts("gcs", None, dir).is_err());
    }
}
