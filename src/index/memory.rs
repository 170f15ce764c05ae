//! In-process [`SearchIndex`] used by tests and dry runs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::SearchIndex;
use super::types::{BatchOutcome, IndexError, IndexSchema, SearchDocument};

/// Keeps indexed documents in a map keyed by section id.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    schema: RwLock<Option<IndexSchema>>,
    documents: RwLock<BTreeMap<String, SearchDocument>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Whether the index holds no documents.
    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    /// Stored documents with the given title, ordered by id.
    pub async fn documents_for(&self, title: &str) -> Vec<SearchDocument> {
        self.documents
            .read()
            .await
            .values()
            .filter(|document| document.title == title)
            .cloned()
            .collect()
    }

    /// Schema passed to the last successful [`SearchIndex::ensure_index`] call.
    pub async fn schema(&self) -> Option<IndexSchema> {
        self.schema.read().await.clone()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let mut current = self.schema.write().await;
        if current.is_none() {
            *current = Some(schema.clone());
        }
        Ok(())
    }

    async fn delete_by_title(&self, title: &str) -> Result<usize, IndexError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|_, document| document.title != title);
        Ok(before - documents.len())
    }

    async fn upsert_batch(&self, batch: &[SearchDocument]) -> Result<BatchOutcome, IndexError> {
        let mut documents = self.documents.write().await;
        for document in batch {
            documents.insert(document.id.clone(), document.clone());
        }
        Ok(BatchOutcome {
            submitted: batch.len(),
            succeeded: batch.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, title: &str) -> SearchDocument {
        SearchDocument {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            category: String::new(),
            page: id.into(),
            page_number: 1,
            file_uri: String::new(),
            folder: String::new(),
            year: String::new(),
            group_ids: Vec::new(),
            title_vector: Vec::new(),
            content_vector: Vec::new(),
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_and_delete_filters_by_title() {
        let index = MemoryIndex::new();
        index
            .upsert_batch(&[document("a-1", "a"), document("a-2", "a"), document("b-1", "b")])
            .await
            .unwrap();
        index.upsert_batch(&[document("a-1", "a")]).await.unwrap();
        assert_eq!(index.len().await, 3);

        assert_eq!(index.delete_by_title("a").await.unwrap(), 2);
        assert_eq!(index.len().await, 1);
        assert_eq!(index.documents_for("b").await.len(), 1);
    }
}
