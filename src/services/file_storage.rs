use crate::error::ApiError;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Byte storage for attachment contents. Callers hold only the opaque
/// reference returned by [`FileStorage::save`].
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Store `bytes` at the relative `path` and return its storage reference.
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<String, ApiError>;
    /// Read the bytes behind a reference. Missing content is `NotFound`.
    async fn read(&self, storage_ref: &str) -> Result<Vec<u8>, ApiError>;
    async fn exists(&self, storage_ref: &str) -> Result<bool, ApiError>;
    /// Remove stored bytes. Deleting a missing reference is not an error.
    async fn delete(&self, storage_ref: &str) -> Result<(), ApiError>;
}

/// Local filesystem storage rooted at a configured directory
pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a reference onto the root. Only plain relative segments are
    /// accepted, so `..`, absolute paths and drive prefixes are rejected.
    fn resolve(&self, storage_ref: &str) -> Result<PathBuf, ApiError> {
        let relative = Path::new(storage_ref);
        if storage_ref.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(ApiError::Validation(format!(
                "Invalid storage reference '{}'",
                storage_ref
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<String, ApiError> {
        let full_path = self.resolve(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ApiError::Internal(format!("Failed to create storage directory: {}", e))
            })?;
        }

        let mut file = fs::File::create(&full_path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to create file: {}", e)))?;
        file.write_all(bytes)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write file: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write file: {}", e)))?;

        tracing::debug!(storage_ref = %path, size = bytes.len(), "stored file");
        Ok(path.to_string())
    }

    async fn read(&self, storage_ref: &str) -> Result<Vec<u8>, ApiError> {
        let full_path = self.resolve(storage_ref)?;
        match fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::NotFound(
                "Attachment content not found".to_string(),
            )),
            Err(e) => Err(ApiError::Internal(format!("Failed to read file: {}", e))),
        }
    }

    async fn exists(&self, storage_ref: &str) -> Result<bool, ApiError> {
        let full_path = self.resolve(storage_ref)?;
        fs::try_exists(&full_path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to check file: {}", e)))
    }

    async fn delete(&self, storage_ref: &str) -> Result<(), ApiError> {
        let full_path = self.resolve(storage_ref)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Internal(format!("Failed to delete file: {}", e))),
        }
    }
}
