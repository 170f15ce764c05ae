//! Blob storage used for staging downloaded files and caching extraction output.

use async_trait::async_trait;
use reqwest::Url;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;

use super::StorageError;

/// Container-scoped binary storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `container/path`, overwriting any existing blob.
    async fn upload(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the blob at `container/path`.
    async fn download(&self, container: &str, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Whether a blob exists at `container/path`.
    async fn exists(&self, container: &str, path: &str) -> Result<bool, StorageError>;

    /// Delete the blob at `container/path`. Missing blobs are not an error.
    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError>;

    /// Public URL at which a remote collaborator can fetch the blob, if the store has one.
    fn locate(&self, container: &str, path: &str) -> Option<String>;
}

/// Normalize a blob path into relative components, rejecting traversal.
fn normalize(path: &str) -> Result<PathBuf, StorageError> {
    let candidate = Path::new(path.trim_start_matches(['/', '\\']));
    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(normalized)
}

/// Blob store backed by a directory per container.
///
/// Blobs are only reachable from outside when the directory is served at a public base URL.
pub struct FilesystemBlobStore {
    root: PathBuf,
    public_url: Option<Url>,
}

impl FilesystemBlobStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_url: None,
        }
    }

    /// Serve blobs from `base`, e.g. a static file server or CDN in front of `root`.
    pub fn with_public_url(mut self, base: &str) -> Result<Self, StorageError> {
        let url = Url::parse(base.trim())
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| StorageError::InvalidUrl(base.to_string()))?;
        self.public_url = Some(url);
        Ok(self)
    }

    fn blob_path(&self, container: &str, path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(normalize(container)?).join(normalize(path)?))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn upload(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.blob_path(container, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::io(parent, source))?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|source| StorageError::io(&target, source))?;
        tracing::debug!(container, path, bytes = bytes.len(), "Uploaded blob");
        Ok(())
    }

    async fn download(&self, container: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.blob_path(container, path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound {
                    container: container.to_string(),
                    path: path.to_string(),
                })
            }
            Err(source) => Err(StorageError::io(target, source)),
        }
    }

    async fn exists(&self, container: &str, path: &str) -> Result<bool, StorageError> {
        let target = self.blob_path(container, path)?;
        tokio::fs::try_exists(&target)
            .await
            .map_err(|source| StorageError::io(target, source))
    }

    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError> {
        let target = self.blob_path(container, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::io(target, source)),
        }
    }

    fn locate(&self, container: &str, path: &str) -> Option<String> {
        let mut url = self.public_url.clone()?;
        {
            let mut segments = url.path_segments_mut().ok()?;
            segments.pop_if_empty().push(container);
            segments.extend(path.split(['/', '\\']).filter(|part| !part.is_empty()));
        }
        Some(url.into())
    }
}

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently held in a container.
    pub async fn count(&self, container: &str) -> usize {
        self.blobs
            .read()
            .await
            .keys()
            .filter(|(name, _)| name == container)
            .count()
    }
}

fn key(container: &str, path: &str) -> (String, String) {
    (
        container.to_string(),
        path.trim_start_matches(['/', '\\']).to_string(),
    )
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, container: &str, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.blobs
            .write()
            .await
            .insert(key(container, path), bytes.to_vec());
        Ok(())
    }

    async fn download(&self, container: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .read()
            .await
            .get(&key(container, path))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            })
    }

    async fn exists(&self, container: &str, path: &str) -> Result<bool, StorageError> {
        Ok(self.blobs.read().await.contains_key(&key(container, path)))
    }

    async fn delete(&self, container: &str, path: &str) -> Result<(), StorageError> {
        self.blobs.write().await.remove(&key(container, path));
        Ok(())
    }

    fn locate(&self, _container: &str, _path: &str) -> Option<String> {
        None
    }
}
