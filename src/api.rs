//! HTTP triggers for the sync pipeline.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /sync/start` – Walk every configured root and persist detected changes.
//! - `POST /sync/clean` – Drop all persisted roots, then run a full sync.
//! - `POST /embeddings/check` – Admit pending documents into the work queue.
//! - `POST /embeddings/process` – Process one work item immediately.
//! - `GET /metrics` – Observe pipeline counters.
//!
//! Trigger endpoints answer with `{ "success": bool, "message": string }`.

use crate::pipeline::PipelineApi;
use crate::sync::{SyncError, WorkItem};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline triggers.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: PipelineApi + 'static,
{
    Router::new()
        .route("/sync/start", post(start_sync::<S>))
        .route("/sync/clean", post(clean_sync::<S>))
        .route("/embeddings/check", post(check_queue::<S>))
        .route("/embeddings/process", post(process_item::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Response body shared by every trigger.
#[derive(Serialize)]
struct TriggerResponse {
    success: bool,
    message: String,
}

impl TriggerResponse {
    fn new(success: bool, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success,
            message: message.into(),
        })
    }
}

async fn start_sync<S>(State(service): State<Arc<S>>) -> Json<TriggerResponse>
where
    S: PipelineApi,
{
    let report = service.start_sync().await;
    tracing::info!(
        roots = report.roots.len(),
        failed = report.failed_roots.len(),
        "Sync trigger completed"
    );
    TriggerResponse::new(report.failed_roots.is_empty(), report.summary())
}

async fn clean_sync<S>(State(service): State<Arc<S>>) -> Result<Json<TriggerResponse>, AppError>
where
    S: PipelineApi,
{
    let report = service.clean_sync().await?;
    tracing::info!(roots = report.roots.len(), "Clean sync trigger completed");
    Ok(TriggerResponse::new(
        report.failed_roots.is_empty(),
        format!("clean sync: {}", report.summary()),
    ))
}

async fn check_queue<S>(State(service): State<Arc<S>>) -> Result<Json<TriggerResponse>, AppError>
where
    S: PipelineApi,
{
    let admitted = service.check_queue().await?;
    Ok(TriggerResponse::new(
        true,
        format!("{admitted} document(s) queued"),
    ))
}

/// Process a single work item supplied in the body.
///
/// Failures are reported through `success: false`; the item is dead-lettered by the worker.
async fn process_item<S>(
    State(service): State<Arc<S>>,
    Json(item): Json<WorkItem>,
) -> Json<TriggerResponse>
where
    S: PipelineApi,
{
    let outcome = service.process_item(item).await;
    TriggerResponse::new(outcome.success, outcome.message)
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> impl IntoResponse
where
    S: PipelineApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(SyncError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "Trigger failed");
        let body = Json(TriggerResponse {
            success: false,
            message: self.0.to_string(),
        });
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(inner: SyncError) -> Self {
        Self(inner)
    }
}
