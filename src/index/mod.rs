//! Vector search index integration.

pub mod client;
pub mod memory;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod synchronizer;
pub mod types;

pub use client::QdrantIndex;
pub use memory::MemoryIndex;
pub use payload::point_id;
pub use synchronizer::{IndexSynchronizer, SyncOutcome};
pub use types::{BatchOutcome, IndexError, IndexSchema, SearchDocument};

use async_trait::async_trait;

/// Operations the pipeline needs from a search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index with the given schema when it does not exist.
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<(), IndexError>;

    /// Remove every entry whose title equals `title`; returns how many were removed.
    async fn delete_by_title(&self, title: &str) -> Result<usize, IndexError>;

    /// Merge-or-insert a batch of documents.
    async fn upsert_batch(&self, documents: &[SearchDocument]) -> Result<BatchOutcome, IndexError>;
}
