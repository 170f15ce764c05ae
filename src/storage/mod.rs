//! Blob and work-queue collaborators.

pub mod blob;
pub mod queue;

pub use blob::{BlobStore, FilesystemBlobStore, MemoryBlobStore};
pub use queue::{FilesystemQueue, MemoryQueue, QueueMessage, WorkQueue};

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by blob stores and work queues.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem access failed.
    #[error("storage I/O failed for {path}: {source}")]
    Io {
        /// Path that could not be accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The requested blob does not exist.
    #[error("blob not found: {container}/{path}")]
    NotFound {
        /// Container name.
        container: String,
        /// Blob path inside the container.
        path: String,
    },
    /// A blob path tried to escape its container.
    #[error("invalid blob path: {0}")]
    InvalidPath(String),
    /// The public base URL of a blob store could not be parsed.
    #[error("invalid public blob URL: {0}")]
    InvalidUrl(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
