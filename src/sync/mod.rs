//! Change detection over content trees and admission of pending work.
//!
//! A sync pass walks every configured root, diffs the observed files against the persisted
//! [`ContentRoot`] record, and replaces that record in one write. A separate queue check
//! hands pending files to workers through the [`WorkQueueGate`].

pub mod detector;
pub mod fingerprint;
pub mod gate;
pub mod service;
pub mod state;
pub mod types;
pub mod walker;

pub use detector::ChangeDetector;
pub use gate::{DEAD_LETTER_QUEUE, WORK_QUEUE, WorkQueueGate};
pub use service::{RootReport, SyncReport, SyncService};
pub use state::{JsonFileStateStore, MemoryStateStore, StateError, SyncStateStore, modify_root};
pub use types::{ChangeSet, ContentRoot, DeadLetter, FileDescriptor, RootSpec, WorkItem};
pub use walker::{ContentTreeWalker, FilesystemTreeWalker, TreeError};

use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised by sync passes and queue admission.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Walking the content tree failed.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Reading or writing the state store failed.
    #[error(transparent)]
    State(#[from] StateError),
    /// The work queue rejected an operation.
    #[error(transparent)]
    Queue(#[from] StorageError),
    /// A work item could not be serialized.
    #[error("failed to encode work item: {0}")]
    Encode(#[from] serde_json::Error),
}
