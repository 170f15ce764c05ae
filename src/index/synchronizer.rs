//! Replace the indexed sections of one document.

use futures_util::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::sync::Arc;

use super::SearchIndex;
use super::types::{IndexError, SearchDocument};
use crate::chunking::Section;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, clean_text};

/// Documents per upsert request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Embedding requests in flight per document.
pub const DEFAULT_EMBEDDING_CONCURRENCY: usize = 4;

/// Counts produced by one [`IndexSynchronizer::synchronize`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Stale entries removed before the upload.
    pub removed: usize,
    /// Documents submitted to the index.
    pub submitted: usize,
    /// Documents the index acknowledged.
    pub succeeded: usize,
    /// Batches rejected by the index.
    pub failed_batches: usize,
}

impl SyncOutcome {
    /// Every submitted document was acknowledged.
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0 && self.succeeded == self.submitted
    }
}

/// Deletes a document's previous sections and uploads the new ones with their embeddings.
pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
    embeddings: Arc<dyn EmbeddingClient>,
    batch_size: usize,
    concurrency: usize,
}

impl IndexSynchronizer {
    /// Create a synchronizer with default batch size and concurrency.
    pub fn new(index: Arc<dyn SearchIndex>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            index,
            embeddings,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_EMBEDDING_CONCURRENCY,
        }
    }

    /// Override the upsert batch size. Zero is clamped to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Override the number of concurrent embedding requests. Zero is clamped to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Remove every indexed section of `title`.
    pub async fn remove_document(&self, title: &str) -> Result<usize, IndexError> {
        let removed = self.index.delete_by_title(title).await?;
        tracing::info!(title, removed, "Removed document from index");
        Ok(removed)
    }

    /// Replace the indexed sections of `title` with `sections`.
    ///
    /// Old entries are deleted even when `sections` is empty. Embedding failures abort the
    /// call; a rejected batch is counted and the remaining batches are still sent.
    pub async fn synchronize(
        &self,
        title: &str,
        sections: &[Section],
    ) -> Result<SyncOutcome, IndexError> {
        let removed = self.index.delete_by_title(title).await?;
        let mut outcome = SyncOutcome {
            removed,
            ..SyncOutcome::default()
        };
        if sections.is_empty() {
            tracing::info!(title, removed, "Document produced no sections");
            return Ok(outcome);
        }

        let documents = self.embed_sections(title, sections).await?;

        for (batch_number, batch) in documents.chunks(self.batch_size).enumerate() {
            outcome.submitted += batch.len();
            match self.index.upsert_batch(batch).await {
                Ok(result) => outcome.succeeded += result.succeeded,
                Err(error) => {
                    outcome.failed_batches += 1;
                    tracing::error!(
                        title,
                        batch = batch_number,
                        size = batch.len(),
                        error = %error,
                        "Index batch failed"
                    );
                }
            }
        }

        tracing::info!(
            title,
            removed = outcome.removed,
            submitted = outcome.submitted,
            succeeded = outcome.succeeded,
            failed_batches = outcome.failed_batches,
            "Index synchronized"
        );
        Ok(outcome)
    }

    async fn embed_sections(
        &self,
        title: &str,
        sections: &[Section],
    ) -> Result<Vec<SearchDocument>, IndexError> {
        let title_vector = self.embed_one(clean_text(title)).await?;

        let texts: Vec<String> = sections
            .iter()
            .map(|section| clean_text(&section.content))
            .collect();
        let content_vectors: Vec<Vec<f32>> = stream::iter(texts)
            .map(|text| self.embed_one(text))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        Ok(sections
            .iter()
            .zip(content_vectors)
            .map(|(section, content_vector)| SearchDocument {
                id: section.id.clone(),
                title: section.title.clone(),
                content: section.content.clone(),
                category: section.category.clone(),
                page: section.page.clone(),
                page_number: section.page_number,
                file_uri: section.file_uri.clone(),
                folder: section.folder.clone(),
                year: section.year.clone(),
                group_ids: section.group_ids.iter().cloned().collect(),
                title_vector: title_vector.clone(),
                content_vector,
            })
            .collect())
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, IndexError> {
        let mut vectors = self.embeddings.generate_embeddings(vec![text]).await?;
        if vectors.len() != 1 {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected 1 embedding, received {}",
                vectors.len()
            ))
            .into());
        }
        Ok(vectors.swap_remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{BatchOutcome, IndexSchema};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingIndex {
        deleted: Mutex<Vec<String>>,
        batches: Mutex<Vec<Vec<SearchDocument>>>,
        fail_batch: Option<usize>,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn ensure_index(&self, _schema: &IndexSchema) -> Result<(), IndexError> {
            Ok(())
        }

        async fn delete_by_title(&self, title: &str) -> Result<usize, IndexError> {
            self.deleted.lock().unwrap().push(title.to_string());
            Ok(3)
        }

        async fn upsert_batch(
            &self,
            documents: &[SearchDocument],
        ) -> Result<BatchOutcome, IndexError> {
            let mut batches = self.batches.lock().unwrap();
            let number = batches.len();
            batches.push(documents.to_vec());
            if self.fail_batch == Some(number) {
                return Err(IndexError::InvalidUrl("rejected".into()));
            }
            Ok(BatchOutcome {
                submitted: documents.len(),
                succeeded: documents.len(),
            })
        }
    }

    #[derive(Default)]
    struct LengthEmbeddings {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingClient for LengthEmbeddings {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            if self.fail {
                return Err(EmbeddingClientError::GenerationFailed("offline".into()));
            }
            self.seen.lock().unwrap().extend(texts.iter().cloned());
            Ok(texts.iter().map(|text| vec![text.len() as f32]).collect())
        }
    }

    fn section(id: &str, content: &str) -> Section {
        Section {
            id: id.into(),
            content: content.into(),
            title: "a.pdf".into(),
            filename: "a.pdf".into(),
            folder: "docs".into(),
            year: String::new(),
            category: String::new(),
            page: id.into(),
            page_number: 1,
            file_uri: "file:///docs/a.pdf".into(),
            group_ids: BTreeSet::from(["staff".to_string()]),
        }
    }

    #[tokio::test]
    async fn synchronize_deletes_then_uploads_in_order() {
        let index = Arc::new(RecordingIndex::default());
        let embeddings = Arc::new(LengthEmbeddings::default());
        let synchronizer = IndexSynchronizer::new(index.clone(), embeddings.clone());

        let sections = vec![section("a_pdf-1", "one\ntwo"), section("a_pdf-2", "x")];
        let outcome = synchronizer.synchronize("a.pdf", &sections).await.unwrap();

        assert_eq!(outcome.removed, 3);
        assert_eq!(outcome.submitted, 2);
        assert!(outcome.is_complete());
        assert_eq!(*index.deleted.lock().unwrap(), vec!["a.pdf".to_string()]);

        let batches = index.batches.lock().unwrap();
        let ids: Vec<_> = batches[0].iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["a_pdf-1", "a_pdf-2"]);
        assert_eq!(batches[0][0].content_vector, vec![7.0]);
        assert_eq!(batches[0][0].group_ids, vec!["staff".to_string()]);
        assert!(embeddings.seen.lock().unwrap().contains(&"one.two".to_string()));
    }

    #[tokio::test]
    async fn empty_sections_still_remove_previous_entries() {
        let index = Arc::new(RecordingIndex::default());
        let synchronizer =
            IndexSynchronizer::new(index.clone(), Arc::new(LengthEmbeddings::default()));

        let outcome = synchronizer.synchronize("a.pdf", &[]).await.unwrap();

        assert_eq!(outcome.removed, 3);
        assert_eq!(outcome.submitted, 0);
        assert!(outcome.is_complete());
        assert!(index.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_batch_is_counted_and_others_continue() {
        let index = Arc::new(RecordingIndex {
            fail_batch: Some(0),
            ..RecordingIndex::default()
        });
        let synchronizer =
            IndexSynchronizer::new(index.clone(), Arc::new(LengthEmbeddings::default()))
                .with_batch_size(1);

        let sections = vec![section("a_pdf-1", "a"), section("a_pdf-2", "b")];
        let outcome = synchronizer.synchronize("a.pdf", &sections).await.unwrap();

        assert_eq!(outcome.submitted, 2);
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.failed_batches, 1);
        assert!(!outcome.is_complete());
        assert_eq!(index.batches.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_upload() {
        let index = Arc::new(RecordingIndex::default());
        let embeddings = Arc::new(LengthEmbeddings {
            fail: true,
            ..LengthEmbeddings::default()
        });
        let synchronizer = IndexSynchronizer::new(index.clone(), embeddings);

        let error = synchronizer
            .synchronize("a.pdf", &[section("a_pdf-1", "a")])
            .await
            .expect_err("embedding failure");

        assert!(matches!(error, IndexError::Embedding(_)));
        assert!(index.batches.lock().unwrap().is_empty());
    }
}
