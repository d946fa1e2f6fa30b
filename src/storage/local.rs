use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{BlobStore, StorageError};

/// Filesystem-backed blob store.
///
/// New objects land in `<root>/private`; `make_public` moves them into
/// `<root>/public`, which the router serves under `/cdn`.
pub struct LocalBlobStore {
    root: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn public_dir(root: &Path) -> PathBuf {
        root.join("public")
    }

    fn private_dir(&self) -> PathBuf {
        self.root.join("private")
    }

    fn object_path(dir: &Path, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.contains(['/', '\\', '\0']) || key.starts_with('.') {
            return Err(StorageError::Denied(format!("invalid object key {key:?}")));
        }
        Ok(dir.join(key))
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [self.private_dir(), Self::public_dir(&self.root)] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::Unavailable(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = Self::object_path(&self.private_dir(), key)?;
        self.ensure_dirs().await?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to write {key}: {e}")))?;
        tracing::debug!("stored {} bytes as {key}", bytes.len());
        Ok(self.public_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut found = false;
        for dir in [self.private_dir(), Self::public_dir(&self.root)] {
            let path = Self::object_path(&dir, key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => found = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::Unavailable(format!(
                        "failed to delete {key}: {e}"
                    )))
                }
            }
        }
        if found {
            Ok(())
        } else {
            Err(StorageError::NotFound(key.to_string()))
        }
    }

    async fn make_public(&self, key: &str) -> Result<(), StorageError> {
        let from = Self::object_path(&self.private_dir(), key)?;
        let to = Self::object_path(&Self::public_dir(&self.root), key)?;
        if tokio::fs::try_exists(&to).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::fs::rename(&from, &to).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Unavailable(format!("failed to publish {key}: {e}"))
            }
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/cdn/{key}", self.base_url)
    }
}
