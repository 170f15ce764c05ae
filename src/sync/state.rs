//! Durable record of the last-known tree per content root.
//!
//! Records are only ever replaced as a whole. The JSON store writes the new record to a
//! temporary sibling and renames it over the previous file, so readers observe either the old
//! or the new tree and never a partial mix.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::ContentRoot;

/// Number of load-modify-replace attempts before a state write is surfaced as a failure.
pub const STATE_WRITE_ATTEMPTS: usize = 3;

/// Errors raised by sync state stores.
#[derive(Debug, Error)]
pub enum StateError {
    /// Filesystem access failed.
    #[error("state store I/O failed for {path}: {source}")]
    Io {
        /// Path that could not be read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A persisted record could not be encoded or decoded.
    #[error("state record {path} is not valid JSON: {source}")]
    Serialization {
        /// Path of the offending record.
        path: PathBuf,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// All write attempts failed.
    #[error("state write for '{root_uri}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Root whose record could not be written.
        root_uri: String,
        /// Number of attempts made.
        attempts: usize,
        /// Last error observed.
        last_error: String,
    },
}

/// Persistence contract for [`ContentRoot`] records.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Load the record for a root, if one exists.
    async fn load(&self, root_uri: &str) -> Result<Option<ContentRoot>, StateError>;

    /// Replace the record for `root.root_uri` as a single unit.
    async fn replace(&self, root: ContentRoot) -> Result<(), StateError>;

    /// Drop the record for a root. Missing records are not an error.
    async fn remove(&self, root_uri: &str) -> Result<(), StateError>;

    /// Enumerate every stored record.
    async fn list(&self) -> Result<Vec<ContentRoot>, StateError>;
}

/// Load a root, apply `mutate`, and replace the record, retrying failed attempts.
///
/// `mutate` returns `false` when there is nothing to change (for instance the document is no
/// longer listed); the record is then left untouched. Returns whether a write happened.
pub async fn modify_root<F>(
    store: &dyn SyncStateStore,
    root_uri: &str,
    mut mutate: F,
) -> Result<bool, StateError>
where
    F: FnMut(&mut ContentRoot) -> bool + Send,
{
    let mut last_error = String::new();
    for attempt in 1..=STATE_WRITE_ATTEMPTS {
        let outcome = async {
            let Some(mut root) = store.load(root_uri).await? else {
                return Ok(false);
            };
            if !mutate(&mut root) {
                return Ok(false);
            }
            root.id = Uuid::new_v4();
            store.replace(root).await?;
            Ok::<bool, StateError>(true)
        }
        .await;

        match outcome {
            Ok(written) => return Ok(written),
            Err(error) => {
                tracing::warn!(root_uri, attempt, error = %error, "State write attempt failed");
                last_error = error.to_string();
            }
        }
    }

    Err(StateError::RetriesExhausted {
        root_uri: root_uri.to_string(),
        attempts: STATE_WRITE_ATTEMPTS,
        last_error,
    })
}

/// Replace a whole record, retrying failed writes up to [`STATE_WRITE_ATTEMPTS`] times.
pub async fn replace_root(store: &dyn SyncStateStore, root: ContentRoot) -> Result<(), StateError> {
    let mut last_error = String::new();
    for attempt in 1..=STATE_WRITE_ATTEMPTS {
        match store.replace(root.clone()).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                tracing::warn!(root_uri = %root.root_uri, attempt, error = %error, "State replace attempt failed");
                last_error = error.to_string();
            }
        }
    }
    Err(StateError::RetriesExhausted {
        root_uri: root.root_uri,
        attempts: STATE_WRITE_ATTEMPTS,
        last_error,
    })
}

/// Stores one JSON document per root under a directory.
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    /// Create a store rooted at `dir`; the directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, root_uri: &str) -> PathBuf {
        let digest = Sha256::digest(root_uri.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_record(path: &Path) -> Result<ContentRoot, StateError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| StateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| StateError::Serialization {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl SyncStateStore for JsonFileStateStore {
    async fn load(&self, root_uri: &str) -> Result<Option<ContentRoot>, StateError> {
        let path = self.record_path(root_uri);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Self::read_record(&path).await.map(Some),
            Ok(false) => Ok(None),
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    async fn replace(&self, root: ContentRoot) -> Result<(), StateError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StateError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let path = self.record_path(&root.root_uri);
        let temp = path.with_extension(format!("json.tmp-{}", Uuid::new_v4()));
        let body = serde_json::to_vec_pretty(&root).map_err(|source| StateError::Serialization {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&temp, body)
            .await
            .map_err(|source| StateError::Io {
                path: temp.clone(),
                source,
            })?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|source| StateError::Io {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(
            root_uri = %root.root_uri,
            documents = root.documents.len(),
            "Replaced content root record"
        );
        Ok(())
    }

    async fn remove(&self, root_uri: &str) -> Result<(), StateError> {
        let path = self.record_path(root_uri);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Io { path, source }),
        }
    }

    async fn list(&self) -> Result<Vec<ContentRoot>, StateError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut roots = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StateError::Io {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            roots.push(Self::read_record(&path).await?);
        }
        roots.sort_by(|a, b| a.root_uri.cmp(&b.root_uri));
        Ok(roots)
    }
}

/// In-process store used by tests and single-shot runs.
#[derive(Default)]
pub struct MemoryStateStore {
    roots: RwLock<BTreeMap<String, ContentRoot>>,
}

impl MemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SyncStateStore for MemoryStateStore {
    async fn load(&self, root_uri: &str) -> Result<Option<ContentRoot>, StateError> {
        Ok(self.roots.read().await.get(root_uri).cloned())
    }

    async fn replace(&self, root: ContentRoot) -> Result<(), StateError> {
        self.roots.write().await.insert(root.root_uri.clone(), root);
        Ok(())
    }

    async fn remove(&self, root_uri: &str) -> Result<(), StateError> {
        self.roots.write().await.remove(root_uri);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContentRoot>, StateError> {
        Ok(self.roots.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::types::FileDescriptor;
    use std::collections::BTreeSet;
    use time::macros::datetime;

    fn sample_root(uri: &str) -> ContentRoot {
        let file = FileDescriptor::new(
            format!("{uri}/a.pdf"),
            "a.pdf",
            "root",
            datetime!(2024-02-02 12:00 UTC),
            "1",
            BTreeSet::new(),
        );
        ContentRoot::new(uri, "/root", vec![file])
    }

    #[tokio::test]
    async fn json_store_replaces_whole_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStateStore::new(dir.path());

        assert!(store.load("file:///root").await.expect("load").is_none());

        let first = sample_root("file:///root");
        store.replace(first.clone()).await.expect("replace");
        assert_eq!(store.load("file:///root").await.expect("load"), Some(first));

        let mut second = sample_root("file:///root");
        second.documents.clear();
        store.replace(second.clone()).await.expect("replace");
        let loaded = store.load("file:///root").await.expect("load").expect("root");
        assert!(loaded.documents.is_empty());
        assert_eq!(store.list().await.expect("list").len(), 1);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn json_store_remove_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStateStore::new(dir.path());
        store.replace(sample_root("file:///a")).await.expect("replace");
        store.remove("file:///a").await.expect("remove");
        store.remove("file:///a").await.expect("remove again");
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn modify_root_writes_only_when_mutated() {
        let store = MemoryStateStore::new();
        store.replace(sample_root("file:///r")).await.expect("replace");

        let written = modify_root(&store, "file:///r", |root| {
            root.documents[0].needs_update = true;
            true
        })
        .await
        .expect("modify");
        assert!(written);
        let root = store.load("file:///r").await.unwrap().unwrap();
        assert!(root.documents[0].needs_update);

        let skipped = modify_root(&store, "file:///r", |_| false)
            .await
            .expect("modify");
        assert!(!skipped);

        let missing = modify_root(&store, "file:///missing", |_| true)
            .await
            .expect("modify");
        assert!(!missing);
    }

    struct FailingStore;

    #[async_trait]
    impl SyncStateStore for FailingStore {
        async fn load(&self, _root_uri: &str) -> Result<Option<ContentRoot>, StateError> {
            Ok(Some(sample_root("file:///r")))
        }

        async fn replace(&self, _root: ContentRoot) -> Result<(), StateError> {
            Err(StateError::Io {
                path: PathBuf::from("/dev/null"),
                source: std::io::Error::other("disk full"),
            })
        }

        async fn remove(&self, _root_uri: &str) -> Result<(), StateError> {
            Ok(())
        }

        async fn list(&self) -> Result<Vec<ContentRoot>, StateError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn modify_root_gives_up_after_bounded_attempts() {
        let mut calls = 0;
        let error = modify_root(&FailingStore, "file:///r", |_| {
            calls += 1;
            true
        })
        .await
        .expect_err("write must fail");
        assert_eq!(calls, STATE_WRITE_ATTEMPTS);
        assert!(matches!(
            error,
            StateError::RetriesExhausted { attempts: STATE_WRITE_ATTEMPTS, .. }
        ));
    }
}
