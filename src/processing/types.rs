//! Error and outcome types for the document worker.

use serde::Serialize;
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::index::IndexError;
use crate::storage::StorageError;
use crate::sync::{StateError, TreeError};

/// Errors emitted while reconciling one document with the index.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// The source file could not be downloaded from its tree.
    #[error("Failed to download document: {0}")]
    Download(#[from] TreeError),
    /// Staging or cache blobs could not be read or written.
    #[error("Blob storage failed: {0}")]
    Storage(#[from] StorageError),
    /// Layout extraction failed or returned a malformed result.
    #[error("Layout extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    /// Embedding or index writes failed.
    #[error("Index synchronization failed: {0}")]
    Index(#[from] IndexError),
    /// The sync state could not be updated after processing.
    #[error("Failed to update sync state: {0}")]
    State(#[from] StateError),
    /// A queue message or cache entry could not be encoded or decoded.
    #[error("Failed to encode or decode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result reported to triggers for one processed work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    /// Whether the document now matches the index.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
}

impl ProcessOutcome {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Totals for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Messages taken from the queue.
    pub received: usize,
    /// Items that completed successfully.
    pub succeeded: usize,
    /// Items that failed or stayed pending.
    pub failed: usize,
}
