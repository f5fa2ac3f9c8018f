use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::{ObjectStorage, StorageError};

/// Clip storage under a local directory. Keys map to relative paths.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve `key` under the root, rejecting absolute paths and `..`.
    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Write(format!("{}: {e}", parent.display())))?;
        }

        // Write then rename so a crash never leaves a truncated clip.
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, &body)
            .await
            .map_err(|e| StorageError::Write(format!("{}: {e}", partial.display())))?;
        tokio::fs::rename(&partial, &path)
            .await
            .map_err(|e| StorageError::Write(format!("{}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), bytes = body.len(), "Clip written");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
