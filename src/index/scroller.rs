//! Streaming helper for walking Qdrant scroll pages without manual loops.

use async_stream::try_stream;
use futures_core::Stream;
use reqwest::Method;
use serde_json::{Value, json};

use super::client::QdrantIndex;
use super::payload::stringify_point_id;
use super::types::{IndexError, ScrollResponse};

const DEFAULT_SCROLL_LIMIT: usize = 256;

/// Stream the ids of every point matching `filter`.
pub fn stream_point_ids<'a>(
    index: &'a QdrantIndex,
    filter: Value,
) -> impl Stream<Item = Result<String, IndexError>> + 'a {
    try_stream! {
        let mut offset: Option<Value> = None;

        loop {
            let mut body = json!({
                "with_payload": false,
                "with_vector": false,
                "limit": DEFAULT_SCROLL_LIMIT,
                "filter": filter.clone(),
            });
            if let (Some(next), Some(object)) = (offset.take(), body.as_object_mut()) {
                object.insert("offset".into(), next);
            }

            let response = index
                .request(Method::POST, &index.collection_path("points/scroll"))
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(collection = index.collection(), status = %status, "Failed to scroll point ids");
                Err(IndexError::UnexpectedStatus { status, body })?;
                break;
            }

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let Some(id) = point.id {
                    yield stringify_point_id(id);
                }
            }

            match result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }
    }
}
