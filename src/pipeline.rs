//! Wiring of the sync service and the document worker behind one handle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::chunking::{ChunkingEngine, ChunkingError};
use crate::config::Config;
use crate::embedding::{EmbeddingClientError, build_embedding_client};
use crate::extraction::{ExtractionError, HttpLayoutExtractor};
use crate::index::{IndexError, IndexSynchronizer, QdrantIndex};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::processing::{
    Collaborators, DocumentProcessor, ProcessOutcome, ProcessingError, ProcessorSettings,
    WorkerReport,
};
use crate::storage::{FilesystemBlobStore, FilesystemQueue, StorageError, WorkQueue};
use crate::sync::{
    FilesystemTreeWalker, JsonFileStateStore, RootSpec, SyncError, SyncReport, SyncService,
    SyncStateStore, WorkItem, WorkQueueGate,
};

/// Errors raised while assembling the pipeline from configuration.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The chunking engine rejected its settings.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// The embedding provider could not be created.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The layout extractor could not be created.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// The search index client could not be created.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The blob store could not be created.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Operations exposed to external triggers (HTTP, CLI).
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Run a sync pass over every configured root.
    async fn start_sync(&self) -> SyncReport;

    /// Drop all persisted roots and run a full sync pass.
    async fn clean_sync(&self) -> Result<SyncReport, SyncError>;

    /// Admit pending documents into the work queue; returns how many were enqueued.
    async fn check_queue(&self) -> Result<usize, SyncError>;

    /// Process one work item immediately, bypassing the queue.
    async fn process_item(&self, item: WorkItem) -> ProcessOutcome;

    /// Retrieve the current metrics snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Sync service plus document worker sharing one set of collaborators.
pub struct Pipeline {
    sync: SyncService,
    processor: DocumentProcessor,
}

impl Pipeline {
    /// Combine an existing sync service and processor.
    pub fn new(sync: SyncService, processor: DocumentProcessor) -> Self {
        Self { sync, processor }
    }

    /// Build the filesystem-backed pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let parts = LocalParts::from_config(config);
        let sync = parts.sync_service(config);

        let index = Arc::new(QdrantIndex::from_config(config)?);
        let embeddings = build_embedding_client(config)?;
        let synchronizer = IndexSynchronizer::new(index.clone(), embeddings)
            .with_batch_size(config.index_batch_size);
        let mut blobs = FilesystemBlobStore::new(config.data_dir.join("blobs"));
        if let Some(base) = &config.blob_public_url {
            blobs = blobs.with_public_url(base)?;
        }
        let collaborators = Collaborators {
            walker: parts.walker,
            blobs: Arc::new(blobs),
            extractor: Arc::new(HttpLayoutExtractor::from_config(config)?),
            index,
            store: parts.store,
            queue: parts.queue,
            metrics: Arc::new(PipelineMetrics::new()),
        };
        let processor = DocumentProcessor::new(
            collaborators,
            ChunkingEngine::from_config(config)?,
            synchronizer,
            ProcessorSettings::from_config(config),
        );

        tracing::info!(
            roots = sync.roots().len(),
            data_dir = %config.data_dir.display(),
            "Pipeline ready"
        );
        Ok(Self::new(sync, processor))
    }

    /// The change-detection half.
    pub fn sync(&self) -> &SyncService {
        &self.sync
    }

    /// The document worker half.
    pub fn processor(&self) -> &DocumentProcessor {
        &self.processor
    }

    /// Drain the work queue, see [`DocumentProcessor::run_worker`].
    pub async fn run_worker(&self, max: Option<usize>) -> Result<WorkerReport, ProcessingError> {
        self.processor.run_worker(max).await
    }
}

/// Build only the sync service; needs no index, embedding, or extraction settings.
pub fn sync_service_from_config(config: &Config) -> SyncService {
    LocalParts::from_config(config).sync_service(config)
}

struct LocalParts {
    walker: Arc<FilesystemTreeWalker>,
    store: Arc<dyn SyncStateStore>,
    queue: Arc<dyn WorkQueue>,
}

impl LocalParts {
    fn from_config(config: &Config) -> Self {
        Self {
            walker: Arc::new(FilesystemTreeWalker::new()),
            store: Arc::new(JsonFileStateStore::new(config.data_dir.join("state"))),
            queue: Arc::new(
                FilesystemQueue::new(config.data_dir.join("queues")).with_visibility_timeout(
                    Duration::from_secs(config.queue_visibility_timeout_secs),
                ),
            ),
        }
    }

    fn sync_service(&self, config: &Config) -> SyncService {
        let roots = config.roots.iter().map(RootSpec::local).collect();
        SyncService::new(
            self.walker.clone(),
            self.store.clone(),
            self.queue.clone(),
            WorkQueueGate::new(config.queue_max_documents, config.queue_peek_limit),
            roots,
        )
    }
}

#[async_trait]
impl PipelineApi for Pipeline {
    async fn start_sync(&self) -> SyncReport {
        self.sync.sync_all().await
    }

    async fn clean_sync(&self) -> Result<SyncReport, SyncError> {
        self.sync.clean_sync().await
    }

    async fn check_queue(&self) -> Result<usize, SyncError> {
        self.sync.check_queue().await
    }

    async fn process_item(&self, item: WorkItem) -> ProcessOutcome {
        self.processor.process(&item).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.processor.metrics().snapshot()
    }
}
