//! Document worker: extraction, chunking, and index synchronization for queued files.

use std::sync::Arc;
use std::time::Duration;

use crate::chunking::ChunkingEngine;
use crate::config::Config;
use crate::extraction::{
    DEFAULT_MAX_POLLS, ExtractionOptions, ExtractionResult, ExtractionSource, LayoutExtractor,
    poll_for_completion,
};
use crate::index::{IndexSchema, IndexSynchronizer, SearchIndex};
use crate::metrics::PipelineMetrics;
use crate::storage::{BlobStore, WorkQueue};
use crate::sync::{
    ContentTreeWalker, DEAD_LETTER_QUEUE, DeadLetter, FileDescriptor, SyncStateStore, WORK_QUEUE,
    WorkItem, modify_root,
};

use super::types::{ProcessOutcome, ProcessingError, WorkerReport};

/// Blob container holding cached extraction results.
pub const RECOGNIZED_CONTAINER: &str = "recognized";
/// Blob container where source files are staged for the extractor.
pub const STAGING_CONTAINER: &str = WORK_QUEUE;

/// Long-lived handles shared by every processed document.
pub struct Collaborators {
    /// Content tree the source files are downloaded from.
    pub walker: Arc<dyn ContentTreeWalker>,
    /// Staging and cache storage.
    pub blobs: Arc<dyn BlobStore>,
    /// Layout extraction service.
    pub extractor: Arc<dyn LayoutExtractor>,
    /// Target search index.
    pub index: Arc<dyn SearchIndex>,
    /// Persisted sync state.
    pub store: Arc<dyn SyncStateStore>,
    /// Work and dead-letter queues.
    pub queue: Arc<dyn WorkQueue>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// Tunables for the worker.
#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    /// Schema passed to [`SearchIndex::ensure_index`] before the first write.
    pub schema: IndexSchema,
    /// Locale forwarded to the extractor.
    pub locale: String,
    /// Delay between extraction polls.
    pub poll_interval: Duration,
    /// Poll budget per extraction job.
    pub max_polls: usize,
}

impl ProcessorSettings {
    /// Derive settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema: IndexSchema {
                name: config.qdrant_collection_name.clone(),
                dimension: config.embedding_dimension,
                distance: config.qdrant_distance,
            },
            locale: config.layout_locale.clone(),
            poll_interval: Duration::from_millis(config.layout_poll_interval_ms),
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

/// Reconciles queued files with the search index.
///
/// Each work item is handled in isolation: a failure is written to the dead-letter queue and
/// leaves the file pending so a later pass retries it.
pub struct DocumentProcessor {
    collaborators: Collaborators,
    chunker: ChunkingEngine,
    synchronizer: IndexSynchronizer,
    settings: ProcessorSettings,
}

impl DocumentProcessor {
    /// Wire a processor.
    pub fn new(
        collaborators: Collaborators,
        chunker: ChunkingEngine,
        synchronizer: IndexSynchronizer,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            collaborators,
            chunker,
            synchronizer,
            settings,
        }
    }

    /// Shared pipeline counters.
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.collaborators.metrics
    }

    /// Process one work item, dead-lettering it on failure.
    pub async fn process(&self, item: &WorkItem) -> ProcessOutcome {
        match self.try_process(item).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    document = %item.document.name,
                    root = %item.root_uri,
                    error = %error,
                    "Failed to process document"
                );
                self.collaborators.metrics.record_failure();
                self.dead_letter(item, &error).await;
                ProcessOutcome::failed(format!("{}: {error}", item.document.name))
            }
        }
    }

    /// Drain up to `max` messages from the work queue (all of them when `None`).
    pub async fn run_worker(&self, max: Option<usize>) -> Result<WorkerReport, ProcessingError> {
        let queue = self.collaborators.queue.as_ref();
        queue.create_if_missing(WORK_QUEUE).await?;
        queue.create_if_missing(DEAD_LETTER_QUEUE).await?;

        let mut report = WorkerReport::default();
        while max.is_none_or(|limit| report.received < limit) {
            let Some(message) = queue.receive(WORK_QUEUE).await? else {
                break;
            };
            report.received += 1;

            match serde_json::from_str::<WorkItem>(&message.body) {
                Ok(item) => {
                    if self.process(&item).await.success {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(error) => {
                    tracing::error!(message_id = %message.id, error = %error, "Discarding undecodable work item");
                    queue.enqueue(DEAD_LETTER_QUEUE, &message.body).await?;
                    report.failed += 1;
                }
            }
            queue.complete(WORK_QUEUE, &message).await?;
        }

        tracing::info!(
            received = report.received,
            succeeded = report.succeeded,
            failed = report.failed,
            "Worker run finished"
        );
        Ok(report)
    }

    async fn try_process(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessingError> {
        if item.document.needs_delete {
            self.remove(item).await
        } else {
            self.reindex(item).await
        }
    }

    async fn remove(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessingError> {
        let document = &item.document;
        let removed = self.synchronizer.remove_document(&document.name).await?;
        modify_root(self.collaborators.store.as_ref(), &item.root_uri, |root| {
            let before = root.documents.len();
            root.documents.retain(|known| known.uri != document.uri);
            root.documents.len() != before
        })
        .await?;
        self.collaborators.metrics.record_removal();
        Ok(ProcessOutcome::ok(format!(
            "{}: removed {removed} section(s)",
            document.name
        )))
    }

    async fn reindex(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessingError> {
        let document = &item.document;
        self.collaborators
            .index
            .ensure_index(&self.settings.schema)
            .await?;

        let result = self.extraction_for(document).await?;
        let sections = self.chunker.chunk(document, &result);
        let outcome = self
            .synchronizer
            .synchronize(&document.name, &sections)
            .await?;

        if !outcome.is_complete() {
            tracing::warn!(
                document = %document.name,
                submitted = outcome.submitted,
                succeeded = outcome.succeeded,
                "Index upload incomplete; document stays pending"
            );
            return Ok(ProcessOutcome::failed(format!(
                "{}: {} of {} section(s) indexed",
                document.name, outcome.succeeded, outcome.submitted
            )));
        }

        // Only clear the flag if the file did not change again since admission.
        let fingerprint = document.fingerprint.clone();
        modify_root(self.collaborators.store.as_ref(), &item.root_uri, |root| {
            match root.document_mut(&document.uri) {
                Some(known) if known.fingerprint == fingerprint && known.needs_update => {
                    known.needs_update = false;
                    true
                }
                _ => false,
            }
        })
        .await?;

        self.collaborators
            .metrics
            .record_document(sections.len() as u64);
        Ok(ProcessOutcome::ok(format!(
            "{}: indexed {} section(s)",
            document.name,
            sections.len()
        )))
    }

    /// Load the cached extraction for `document`, running the extractor on a cache miss.
    async fn extraction_for(
        &self,
        document: &FileDescriptor,
    ) -> Result<ExtractionResult, ProcessingError> {
        let blobs = self.collaborators.blobs.as_ref();
        let cache_path = format!("{stem}/{stem}.json", stem = document.stem());
        let marker_path = format!("{stem}/{stem}.fingerprint", stem = document.stem());

        if self.cache_is_fresh(document, &cache_path, &marker_path).await? {
            tracing::debug!(document = %document.name, "Using cached extraction");
            let bytes = blobs.download(RECOGNIZED_CONTAINER, &cache_path).await?;
            return Ok(ExtractionResult::from_json(&bytes)?);
        }

        let bytes = self.collaborators.walker.download(document).await?;
        let staging_path = if document.folder.is_empty() {
            document.name.clone()
        } else {
            format!("{}/{}", document.folder, document.name)
        };
        blobs
            .upload(STAGING_CONTAINER, &staging_path, &bytes)
            .await?;

        let extracted = self.extract(document, &staging_path, bytes).await;

        if let Err(error) = blobs.delete(STAGING_CONTAINER, &staging_path).await {
            tracing::warn!(path = %staging_path, error = %error, "Failed to delete staged file");
        }

        let payload = extracted?;
        let result = ExtractionResult::from_value(payload.clone())?;
        blobs
            .upload(
                RECOGNIZED_CONTAINER,
                &cache_path,
                &serde_json::to_vec(&payload)?,
            )
            .await?;
        blobs
            .upload(
                RECOGNIZED_CONTAINER,
                &marker_path,
                document.fingerprint.as_bytes(),
            )
            .await?;
        tracing::info!(
            document = %document.name,
            pages = result.page_count(),
            paragraphs = result.paragraphs.len(),
            tables = result.tables.len(),
            "Extracted document layout"
        );
        Ok(result)
    }

    /// A cached extraction is reused only while the file keeps the fingerprint it was
    /// extracted with.
    async fn cache_is_fresh(
        &self,
        document: &FileDescriptor,
        cache_path: &str,
        marker_path: &str,
    ) -> Result<bool, ProcessingError> {
        let blobs = self.collaborators.blobs.as_ref();
        if !blobs.exists(RECOGNIZED_CONTAINER, cache_path).await?
            || !blobs.exists(RECOGNIZED_CONTAINER, marker_path).await?
        {
            return Ok(false);
        }
        let marker = blobs.download(RECOGNIZED_CONTAINER, marker_path).await?;
        Ok(marker == document.fingerprint.as_bytes())
    }

    async fn extract(
        &self,
        document: &FileDescriptor,
        staging_path: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value, ProcessingError> {
        // Without a public URL for the staged copy the bytes go inline.
        let source = match self
            .collaborators
            .blobs
            .locate(STAGING_CONTAINER, staging_path)
        {
            Some(url) => ExtractionSource::Url(url),
            None => ExtractionSource::Bytes(bytes),
        };
        let options = ExtractionOptions {
            locale: self.settings.locale.clone(),
            high_resolution: document.extension().as_deref() == Some("pdf"),
        };
        let extractor = self.collaborators.extractor.as_ref();
        let job = extractor.start_extraction(&source, &options).await?;
        Ok(poll_for_completion(
            extractor,
            &job,
            self.settings.poll_interval,
            self.settings.max_polls,
        )
        .await?)
    }

    async fn dead_letter(&self, item: &WorkItem, error: &ProcessingError) {
        let letter = DeadLetter {
            item: item.clone(),
            error: error.to_string(),
        };
        let body = match serde_json::to_string(&letter) {
            Ok(body) => body,
            Err(encode_error) => {
                tracing::error!(error = %encode_error, "Failed to encode dead letter");
                return;
            }
        };
        let queue = self.collaborators.queue.as_ref();
        let sent = async {
            queue.create_if_missing(DEAD_LETTER_QUEUE).await?;
            queue.enqueue(DEAD_LETTER_QUEUE, &body).await
        }
        .await;
        if let Err(queue_error) = sent {
            tracing::error!(error = %queue_error, "Failed to enqueue dead letter");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkingOptions, whitespace_counter};
    use crate::config::VectorDistance;
    use crate::embedding::HashingEmbeddingClient;
    use crate::extraction::{ExtractionError, ExtractionJob, JobStatus};
    use crate::index::MemoryIndex;
    use crate::storage::{MemoryBlobStore, MemoryQueue};
    use crate::sync::{ContentRoot, MemoryStateStore, RootSpec, TreeError};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    const ROOT: &str = "file:///library";

    struct BytesWalker;

    #[async_trait]
    impl ContentTreeWalker for BytesWalker {
        async fn walk(
            &self,
            _root: &RootSpec,
        ) -> Result<BTreeMap<String, FileDescriptor>, TreeError> {
            Ok(BTreeMap::new())
        }

        async fn download(&self, document: &FileDescriptor) -> Result<Vec<u8>, TreeError> {
            Ok(document.name.as_bytes().to_vec())
        }
    }

    struct StubExtractor {
        payload: Value,
        started: AtomicUsize,
        options: std::sync::Mutex<Vec<ExtractionOptions>>,
        sources: std::sync::Mutex<Vec<ExtractionSource>>,
        fail: bool,
    }

    impl StubExtractor {
        fn new(payload: Value) -> Self {
            Self {
                payload,
                started: AtomicUsize::new(0),
                options: std::sync::Mutex::new(Vec::new()),
                sources: std::sync::Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl LayoutExtractor for StubExtractor {
        async fn start_extraction(
            &self,
            source: &ExtractionSource,
            options: &ExtractionOptions,
        ) -> Result<ExtractionJob, ExtractionError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.options.lock().unwrap().push(options.clone());
            self.sources.lock().unwrap().push(source.clone());
            Ok(ExtractionJob {
                operation_url: format!("memory://{}#job", source.kind()),
            })
        }

        async fn poll(&self, _job: &ExtractionJob) -> Result<JobStatus, ExtractionError> {
            if self.fail {
                return Ok(JobStatus::Failed("corrupt file".into()));
            }
            Ok(JobStatus::Succeeded(self.payload.clone()))
        }
    }

    fn layout() -> Value {
        json!({
            "analyzeResult": {
                "content": "Introduction to the annual plan\nBudget lines follow",
                "pages": [{"pageNumber": 1}],
                "paragraphs": [
                    {"content": "Introduction to the annual plan", "spans": [{"offset": 0, "length": 31}], "boundingRegions": [{"pageNumber": 1}]},
                    {"content": "Budget lines follow", "spans": [{"offset": 32, "length": 19}], "boundingRegions": [{"pageNumber": 1}]}
                ],
                "tables": []
            }
        })
    }

    fn descriptor(name: &str) -> FileDescriptor {
        let mut document = FileDescriptor::new(
            format!("{ROOT}/docs/{name}"),
            name,
            "docs",
            datetime!(2024-03-01 10:00 UTC),
            "1",
            BTreeSet::new(),
        );
        document.needs_update = true;
        document
    }

    struct Harness {
        processor: DocumentProcessor,
        index: Arc<MemoryIndex>,
        store: Arc<MemoryStateStore>,
        queue: Arc<MemoryQueue>,
        blobs: Arc<MemoryBlobStore>,
        extractor: Arc<StubExtractor>,
    }

    fn harness(extractor: StubExtractor) -> Harness {
        let index = Arc::new(MemoryIndex::new());
        let store = Arc::new(MemoryStateStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let extractor = Arc::new(extractor);
        let collaborators = Collaborators {
            walker: Arc::new(BytesWalker),
            blobs: blobs.clone(),
            extractor: extractor.clone(),
            index: index.clone(),
            store: store.clone(),
            queue: queue.clone(),
            metrics: Arc::new(PipelineMetrics::new()),
        };
        let chunker = ChunkingEngine::new(
            ChunkingOptions {
                min_chunk_size: 5,
                ..ChunkingOptions::default()
            },
            whitespace_counter(),
        )
        .unwrap();
        let synchronizer =
            IndexSynchronizer::new(index.clone(), Arc::new(HashingEmbeddingClient::new(8)));
        let settings = ProcessorSettings {
            schema: IndexSchema {
                name: "docs".into(),
                dimension: 8,
                distance: VectorDistance::Cosine,
            },
            locale: "es-ES".into(),
            poll_interval: Duration::from_millis(1),
            max_polls: 3,
        };
        Harness {
            processor: DocumentProcessor::new(collaborators, chunker, synchronizer, settings),
            index,
            store,
            queue,
            blobs,
            extractor,
        }
    }

    async fn seed(store: &MemoryStateStore, documents: Vec<FileDescriptor>) {
        store
            .replace(ContentRoot::new(ROOT, "/library", documents))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reindex_writes_sections_caches_layout_and_clears_flag() {
        let h = harness(StubExtractor::new(layout()));
        let document = descriptor("plan.pdf");
        seed(&h.store, vec![document.clone()]).await;

        let item = WorkItem {
            root_uri: ROOT.into(),
            document,
        };
        let outcome = h.processor.process(&item).await;

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(h.index.documents_for("plan.pdf").await.len(), 1);
        assert_eq!(h.index.schema().await.map(|schema| schema.dimension), Some(8));
        assert_eq!(h.blobs.count(RECOGNIZED_CONTAINER).await, 2);
        assert_eq!(h.blobs.count(STAGING_CONTAINER).await, 0);
        assert!(h.extractor.options.lock().unwrap()[0].high_resolution);
        assert_eq!(
            h.extractor.sources.lock().unwrap()[0],
            ExtractionSource::Bytes(b"plan.pdf".to_vec())
        );

        let root = h.store.load(ROOT).await.unwrap().unwrap();
        assert!(!root.documents[0].needs_update);
        assert_eq!(h.processor.metrics().snapshot().documents_indexed, 1);
    }

    #[tokio::test]
    async fn cached_layout_skips_extraction() {
        let h = harness(StubExtractor::new(layout()));
        let document = descriptor("plan.docx");
        seed(&h.store, vec![document.clone()]).await;
        let item = WorkItem {
            root_uri: ROOT.into(),
            document,
        };

        h.processor.process(&item).await;
        h.processor.process(&item).await;

        assert_eq!(h.extractor.started.load(Ordering::SeqCst), 1);
        assert!(!h.extractor.options.lock().unwrap()[0].high_resolution);
    }

    #[tokio::test]
    async fn changed_fingerprint_invalidates_cached_layout() {
        let h = harness(StubExtractor::new(layout()));
        let document = descriptor("plan.docx");
        h.processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document: document.clone(),
            })
            .await;

        let mut edited = document;
        edited.version = "2".into();
        edited.refresh_fingerprint();
        h.processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document: edited,
            })
            .await;

        assert_eq!(h.extractor.started.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_removes_sections_and_descriptor() {
        let h = harness(StubExtractor::new(layout()));
        let kept = descriptor("kept.pdf");
        let mut gone = descriptor("gone.pdf");
        h.processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document: gone.clone(),
            })
            .await;
        assert!(!h.index.documents_for("gone.pdf").await.is_empty());

        gone.needs_update = false;
        gone.needs_delete = true;
        seed(&h.store, vec![gone.clone(), kept]).await;

        let outcome = h
            .processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document: gone,
            })
            .await;

        assert!(outcome.success);
        assert!(h.index.documents_for("gone.pdf").await.is_empty());
        let root = h.store.load(ROOT).await.unwrap().unwrap();
        assert_eq!(root.documents.len(), 1);
        assert_eq!(root.documents[0].name, "kept.pdf");
    }

    #[tokio::test]
    async fn failed_extraction_is_dead_lettered_and_stays_pending() {
        let mut extractor = StubExtractor::new(layout());
        extractor.fail = true;
        let h = harness(extractor);
        let document = descriptor("broken.pdf");
        seed(&h.store, vec![document.clone()]).await;

        let outcome = h
            .processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document,
            })
            .await;

        assert!(!outcome.success);
        assert_eq!(h.queue.len(DEAD_LETTER_QUEUE).await, 1);
        let letter = h.queue.peek(DEAD_LETTER_QUEUE, 1).await.unwrap();
        let letter: DeadLetter = serde_json::from_str(&letter[0].body).unwrap();
        assert!(letter.error.contains("corrupt file"));
        assert!(h.store.load(ROOT).await.unwrap().unwrap().documents[0].needs_update);
        assert_eq!(h.blobs.count(STAGING_CONTAINER).await, 0);
        assert_eq!(h.processor.metrics().snapshot().documents_failed, 1);
    }

    #[tokio::test]
    async fn out_of_range_layout_is_dead_lettered_and_stays_pending() {
        let h = harness(StubExtractor::new(json!({
            "content": "City",
            "tables": [{
                "rowCount": 1,
                "columnCount": 1,
                "cells": [{"rowIndex": 0, "columnIndex": 0, "content": "City",
                           "spans": [{"offset": u64::MAX - 1, "length": 5}]}]
            }]
        })));
        let document = descriptor("rates.pdf");
        seed(&h.store, vec![document.clone()]).await;

        let outcome = h
            .processor
            .process(&WorkItem {
                root_uri: ROOT.into(),
                document,
            })
            .await;

        assert!(!outcome.success);
        let letters = h.queue.peek(DEAD_LETTER_QUEUE, 10).await.unwrap();
        assert_eq!(letters.len(), 1);
        let letter: DeadLetter = serde_json::from_str(&letters[0].body).unwrap();
        assert!(letter.error.contains("exceeds content length"), "{}", letter.error);
        assert!(h.store.load(ROOT).await.unwrap().unwrap().documents[0].needs_update);
        assert!(h.index.documents_for("rates.pdf").await.is_empty());
        assert_eq!(h.blobs.count(RECOGNIZED_CONTAINER).await, 0);
    }

    #[tokio::test]
    async fn run_worker_drains_queue_and_completes_messages() {
        let h = harness(StubExtractor::new(layout()));
        let first = descriptor("a.pdf");
        let second = descriptor("b.pdf");
        seed(&h.store, vec![first.clone(), second.clone()]).await;
        for document in [first, second] {
            let body = serde_json::to_string(&WorkItem {
                root_uri: ROOT.into(),
                document,
            })
            .unwrap();
            h.queue.enqueue(WORK_QUEUE, &body).await.unwrap();
        }
        h.queue.enqueue(WORK_QUEUE, "not json").await.unwrap();

        let report = h.processor.run_worker(Some(2)).await.unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(h.queue.len(WORK_QUEUE).await, 1);

        let report = h.processor.run_worker(None).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(h.queue.is_empty(WORK_QUEUE).await);
        assert_eq!(h.queue.len(DEAD_LETTER_QUEUE).await, 1);
    }
}
