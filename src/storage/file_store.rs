//! File-backed snapshot store
//!
//! One JSON file per document under the configured data directory.
//! Document ids may contain path-hostile characters (colons, slashes), so
//! file names carry the percent-encoded id.

use crate::core::error::StorageError;
use crate::storage::store::DocumentStore;
use async_trait::async_trait;
use percent_encoding::{percent_encode, NON_ALPHANUMERIC};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};

/// Snapshot store writing one `<encoded id>.json` per document
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `data_dir` (created on first save)
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { data_dir: data_dir.as_ref().to_path_buf() }
    }

    fn path_for(&self, document_id: &str) -> PathBuf {
        let encoded = percent_encode(document_id.as_bytes(), NON_ALPHANUMERIC).to_string();
        self.data_dir.join(format!("{}.json", encoded))
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load(&self, document_id: &str) -> Result<Option<Json>, StorageError> {
        let path = self.path_for(document_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Load(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Load(format!("{}: {}", path.display(), e))),
        }
    }

    async fn save(&self, document_id: &str, state: &Json) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StorageError::Save(e.to_string()))?;
        let path = self.path_for(document_id);
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| StorageError::Save(e.to_string()))?;
        // Write-then-rename keeps a crash from truncating the snapshot
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StorageError::Save(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StorageError::Save(format!("{}: {}", path.display(), e)))
    }

    async fn delete(&self, document_id: &str) -> Result<(), StorageError> {
        let path = self.path_for(document_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Delete(format!("{}: {}", path.display(), e))),
        }
    }
}
