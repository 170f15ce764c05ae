//! Shared types used by the search index client and the synchronizer.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigError, VectorDistance};
use crate::embedding::EmbeddingClientError;

/// Name of the vector field holding the title embedding.
pub const TITLE_VECTOR: &str = "title_vector";
/// Name of the vector field holding the content embedding.
pub const CONTENT_VECTOR: &str = "content_vector";

/// Errors returned while interacting with the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Embedding generation failed for a document.
    #[error("Failed to embed document: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index settings are missing.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Shape of the index: vector size and similarity metric for both vector fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Collection name.
    pub name: String,
    /// Embedding dimensionality.
    pub dimension: usize,
    /// Similarity metric.
    pub distance: VectorDistance,
}

/// One indexed section with its vectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    /// Section id; mapped to a deterministic point id.
    pub id: String,
    /// Document title (file name).
    pub title: String,
    /// Section text.
    pub content: String,
    /// Category label.
    pub category: String,
    /// Page label.
    pub page: String,
    /// Page where the section starts.
    pub page_number: u32,
    /// URI of the source file.
    pub file_uri: String,
    /// Owning folder.
    pub folder: String,
    /// Year metadata.
    pub year: String,
    /// Access groups.
    pub group_ids: Vec<String>,
    /// Embedding of the cleaned title.
    #[serde(skip)]
    pub title_vector: Vec<f32>,
    /// Embedding of the cleaned content.
    #[serde(skip)]
    pub content_vector: Vec<f32>,
}

/// Result of submitting one batch of documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Documents sent in the request.
    pub submitted: usize,
    /// Documents the index acknowledged.
    pub succeeded: usize,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) id: Option<Value>,
}
