//! File-based checkpoint store: one file per key.
//!
//! Storage location: `~/.tandem/checkpoints/` unless a directory is given.
//! Values are written to a temporary file and renamed into place, so a
//! reader never sees a half-written checkpoint.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tandem_core::error::StoreError;
use tandem_core::store::CheckpointStore;
use tracing::debug;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default directory: `~/.tandem/checkpoints`
    pub fn default_dir() -> PathBuf {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".tandem").join("checkpoints")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a key is stored in. Anything outside `[A-Za-z0-9._-]` becomes `_`.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.ckpt"))
    }
}

#[async_trait]
impl CheckpointStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create checkpoint directory: {e}"))
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("ckpt.tmp");
        tokio::fs::write(&tmp, &value)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write checkpoint: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to commit checkpoint: {e}")))?;

        debug!(key, path = %path.display(), bytes = value.len(), "Checkpoint written");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Storage(format!("Failed to read checkpoint: {e}"))),
        }
    }
}
