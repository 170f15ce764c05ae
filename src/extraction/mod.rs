//! Layout extraction: submit a document, poll the job, and decode the typed result.

pub mod client;
pub mod types;

pub use client::HttpLayoutExtractor;
pub use types::{BoundingRegion, Cell, ExtractionResult, Page, Paragraph, Span, Table};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Upper bound on polls before a job is considered stuck.
pub const DEFAULT_MAX_POLLS: usize = 900;

/// Errors raised by layout extraction.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extraction service is not configured.
    #[error("layout extraction is not configured: {0}")]
    NotConfigured(String),
    /// The HTTP request could not be completed.
    #[error("layout service request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The service answered with a non-success status.
    #[error("layout service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },
    /// The submit response carried no operation URL.
    #[error("layout service response is missing the Operation-Location header")]
    MissingOperation,
    /// The job finished in a failed state.
    #[error("layout extraction job failed: {0}")]
    JobFailed(String),
    /// The job did not finish within the poll budget.
    #[error("layout extraction did not finish after {polls} polls")]
    TimedOut {
        /// Number of polls performed.
        polls: usize,
    },
    /// The payload could not be decoded into an [`ExtractionResult`].
    #[error("malformed extraction result: {0}")]
    Malformed(#[source] serde_json::Error),
    /// The configured endpoint is not a valid base URL.
    #[error("invalid layout endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Where the extractor reads the document from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionSource {
    /// A URL the extraction service can fetch on its own.
    Url(String),
    /// The document bytes, uploaded inline with the request.
    Bytes(Vec<u8>),
}

impl ExtractionSource {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// Per-request extraction settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Locale hint, e.g. `es-ES`.
    pub locale: String,
    /// Request high-resolution OCR.
    pub high_resolution: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            locale: "es-ES".to_string(),
            high_resolution: false,
        }
    }
}

/// Handle to a submitted extraction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionJob {
    /// URL polled for the job status.
    pub operation_url: String,
}

/// Status of an extraction job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Accepted but not started.
    NotStarted,
    /// Still running.
    Running,
    /// Finished; carries the raw analysis payload.
    Succeeded(Value),
    /// Finished with an error message.
    Failed(String),
}

/// Asynchronous document layout extractor.
#[async_trait]
pub trait LayoutExtractor: Send + Sync {
    /// Submit a document for analysis.
    async fn start_extraction(
        &self,
        source: &ExtractionSource,
        options: &ExtractionOptions,
    ) -> Result<ExtractionJob, ExtractionError>;

    /// Query the current status of a job.
    async fn poll(&self, job: &ExtractionJob) -> Result<JobStatus, ExtractionError>;
}

/// Poll `job` every `interval` until it succeeds, fails, or `max_polls` is reached.
///
/// Dropping the returned future stops waiting; the remote job keeps running.
pub async fn poll_for_completion(
    extractor: &dyn LayoutExtractor,
    job: &ExtractionJob,
    interval: Duration,
    max_polls: usize,
) -> Result<Value, ExtractionError> {
    for poll in 1..=max_polls {
        match extractor.poll(job).await? {
            JobStatus::Succeeded(payload) => {
                tracing::debug!(polls = poll, "Layout extraction finished");
                return Ok(payload);
            }
            JobStatus::Failed(message) => return Err(ExtractionError::JobFailed(message)),
            JobStatus::NotStarted | JobStatus::Running => {
                tracing::trace!(poll, "Layout extraction still running");
                tokio::time::sleep(interval).await;
            }
        }
    }
    Err(ExtractionError::TimedOut { polls: max_polls })
}
