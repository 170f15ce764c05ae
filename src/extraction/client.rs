//! REST client for a Document-Intelligence-style layout service.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    ExtractionError, ExtractionJob, ExtractionOptions, ExtractionSource, JobStatus,
    LayoutExtractor,
};
use crate::config::Config;

const API_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_HEADER: &str = "Operation-Location";
/// API version requested from the layout service.
pub const DEFAULT_API_VERSION: &str = "2023-07-31";

/// Submits documents by URL or inline bytes and polls the returned operation.
pub struct HttpLayoutExtractor {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    status: String,
    #[serde(default)]
    analyze_result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl HttpLayoutExtractor {
    /// Create a client for `endpoint` using the given model.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let endpoint = endpoint.into();
        let parsed = Url::parse(endpoint.trim())
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(ExtractionError::InvalidEndpoint(endpoint))?;
        let client = Client::builder().user_agent("docsync/layout").build()?;
        Ok(Self {
            client,
            endpoint: parsed,
            api_key: api_key.into(),
            model: model.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Build the extractor from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ExtractionError> {
        let endpoint = config
            .layout_endpoint
            .clone()
            .ok_or_else(|| ExtractionError::NotConfigured("LAYOUT_ENDPOINT is not set".into()))?;
        let api_key = config
            .layout_api_key
            .clone()
            .ok_or_else(|| ExtractionError::NotConfigured("LAYOUT_API_KEY is not set".into()))?;
        Self::new(endpoint, api_key, config.layout_model.clone())
    }

    fn analyze_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["formrecognizer", "documentModels"])
                .push(&format!("{}:analyze", self.model));
        }
        url
    }

    fn source_body(source: &ExtractionSource) -> Value {
        match source {
            ExtractionSource::Url(url) => json!({ "urlSource": url }),
            ExtractionSource::Bytes(bytes) => {
                json!({ "base64Source": general_purpose::STANDARD.encode(bytes) })
            }
        }
    }

    async fn ensure_success(response: Response) -> Result<Response, ExtractionError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ExtractionError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl LayoutExtractor for HttpLayoutExtractor {
    async fn start_extraction(
        &self,
        source: &ExtractionSource,
        options: &ExtractionOptions,
    ) -> Result<ExtractionJob, ExtractionError> {
        let mut request = self
            .client
            .post(self.analyze_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[
                ("api-version", self.api_version.as_str()),
                ("locale", options.locale.as_str()),
                ("stringIndexType", "unicodeCodePoint"),
            ]);
        if options.high_resolution {
            request = request.query(&[("features", "ocrHighResolution")]);
        }
        let response = request.json(&Self::source_body(source)).send().await?;
        let response = Self::ensure_success(response).await?;

        let operation_url = response
            .headers()
            .get(OPERATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ExtractionError::MissingOperation)?;

        tracing::info!(
            source = source.kind(),
            model = %self.model,
            high_resolution = options.high_resolution,
            "Submitted document for layout extraction"
        );
        Ok(ExtractionJob { operation_url })
    }

    async fn poll(&self, job: &ExtractionJob) -> Result<JobStatus, ExtractionError> {
        let response = self
            .client
            .get(&job.operation_url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ExtractionError::JobFailed(format!(
                "operation {} not found",
                job.operation_url
            )));
        }
        let body: OperationBody = Self::ensure_success(response).await?.json().await?;

        Ok(match body.status.as_str() {
            "notStarted" => JobStatus::NotStarted,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded(body.analyze_result.unwrap_or(Value::Null)),
            _ => JobStatus::Failed(
                body.error
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| format!("status {}", body.status)),
            ),
        })
    }
}
