//! HTTP client wrapper implementing [`SearchIndex`] on top of Qdrant.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::{Client, Method, StatusCode};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

use super::SearchIndex;
use super::payload::{build_point, title_filter};
use super::scroller::stream_point_ids;
use super::types::{
    BatchOutcome, CONTENT_VECTOR, IndexError, IndexSchema, SearchDocument, TITLE_VECTOR,
};
use crate::config::Config;

/// Payload fields indexed for filtering.
const PAYLOAD_INDEXES: [(&str, &str); 4] = [
    ("title", "keyword"),
    ("folder", "keyword"),
    ("fileUri", "keyword"),
    ("groupIds", "keyword"),
];

/// Lightweight Qdrant client bound to one collection.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
    ensured: AtomicBool,
}

impl QdrantIndex {
    /// Create a client for `collection` at `base_url`.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("docsync/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(IndexError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
            ensured: AtomicBool::new(false),
        })
    }

    /// Create a client from configuration.
    pub fn from_config(config: &Config) -> Result<Self, IndexError> {
        Self::new(
            config.require_qdrant_url()?,
            config.qdrant_api_key.clone(),
            config.qdrant_collection_name.clone(),
        )
    }

    /// Collection this client writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn collection_path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("collections/{}", self.collection)
        } else {
            format!("collections/{}/{suffix}", self.collection)
        }
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &self.collection_path(""))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        let vector = json!({
            "size": schema.dimension,
            "distance": schema.distance.as_qdrant_str(),
        });
        let body = json!({
            "vectors": {
                TITLE_VECTOR: vector.clone(),
                CONTENT_VECTOR: vector,
            }
        });

        let response = self
            .request(Method::PUT, &self.collection_path(""))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(
                collection = %self.collection,
                dimension = schema.dimension,
                distance = schema.distance.as_qdrant_str(),
                "Created collection"
            );
        })
        .await
    }

    async fn ensure_payload_indexes(&self) -> Result<(), IndexError> {
        for (field, schema) in PAYLOAD_INDEXES {
            let response = self
                .request(Method::PUT, &self.collection_path("index"))
                .json(&json!({ "field_name": field, "field_schema": schema }))
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for QdrantIndex {
    async fn ensure_index(&self, schema: &IndexSchema) -> Result<(), IndexError> {
        if self.ensured.load(Ordering::Acquire) {
            return Ok(());
        }
        if !self.collection_exists().await? {
            self.create_collection(schema).await?;
        }
        self.ensure_payload_indexes().await?;
        self.ensured.store(true, Ordering::Release);
        Ok(())
    }

    async fn delete_by_title(&self, title: &str) -> Result<usize, IndexError> {
        let ids: Vec<String> = stream_point_ids(self, title_filter(title))
            .try_collect()
            .await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let count = ids.len();
        let response = self
            .request(Method::POST, &self.collection_path("points/delete"))
            .query(&[("wait", true)])
            .json(&json!({ "points": ids }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::info!(collection = %self.collection, title, removed = count, "Deleted document points");
        })
        .await?;
        Ok(count)
    }

    async fn upsert_batch(&self, documents: &[SearchDocument]) -> Result<BatchOutcome, IndexError> {
        if documents.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let points: Vec<_> = documents.iter().map(build_point).collect();
        let submitted = points.len();
        let response = self
            .request(Method::PUT, &self.collection_path("points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, points = submitted, "Points upserted");
        })
        .await?;

        Ok(BatchOutcome {
            submitted,
            succeeded: submitted,
        })
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
