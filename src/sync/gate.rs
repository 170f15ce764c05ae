//! Admission control into the work queue.

use crate::storage::WorkQueue;

use super::SyncError;
use super::types::WorkItem;

/// Queue holding documents waiting to be processed.
pub const WORK_QUEUE: &str = "library-to-process";
/// Queue receiving items that could not be processed.
pub const DEAD_LETTER_QUEUE: &str = "failed-library-to-process";

/// Default cap on messages allowed to sit in the work queue.
pub const DEFAULT_MAX_DOCUMENTS: usize = 5;
/// Default number of messages inspected to estimate queue depth.
pub const DEFAULT_PEEK_LIMIT: usize = 10;

/// Bounds how many pending documents are handed to workers at once.
///
/// Depth is estimated by peeking, so it never exceeds `peek_limit`; a ceiling above the peek
/// limit therefore under-counts a long queue. Items admitted in one pass may be admitted again
/// in a later pass while still pending; workers tolerate duplicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkQueueGate {
    /// Target ceiling on queued messages.
    pub max_documents: usize,
    /// Messages peeked to estimate the current depth.
    pub peek_limit: usize,
}

impl Default for WorkQueueGate {
    fn default() -> Self {
        Self {
            max_documents: DEFAULT_MAX_DOCUMENTS,
            peek_limit: DEFAULT_PEEK_LIMIT,
        }
    }
}

impl WorkQueueGate {
    /// Create a gate with explicit limits.
    pub fn new(max_documents: usize, peek_limit: usize) -> Self {
        Self {
            max_documents,
            peek_limit,
        }
    }

    /// Enqueue as many `candidates` as the free capacity allows, in order.
    ///
    /// Returns the number of items enqueued.
    pub async fn admit(
        &self,
        queue: &dyn WorkQueue,
        candidates: Vec<WorkItem>,
    ) -> Result<usize, SyncError> {
        queue.create_if_missing(WORK_QUEUE).await?;
        let depth = queue.peek(WORK_QUEUE, self.peek_limit).await?.len();
        let capacity = self.max_documents.saturating_sub(depth);

        let mut admitted = 0;
        for item in candidates.into_iter().take(capacity) {
            let body = serde_json::to_string(&item)?;
            queue.enqueue(WORK_QUEUE, &body).await?;
            tracing::debug!(uri = %item.document.uri, "Admitted document into work queue");
            admitted += 1;
        }

        tracing::info!(
            depth,
            capacity,
            admitted,
            ceiling = self.max_documents,
            "Work queue admission complete"
        );
        Ok(admitted)
    }
}
