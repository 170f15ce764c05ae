//! Embedding providers.
//!
//! Every provider implements [`EmbeddingClient`]; [`build_embedding_client`] picks one from the
//! configuration. Text is normalized with [`clean_text`] by the index synchronizer before it
//! reaches a provider.

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, EmbeddingProvider};

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider response could not be parsed or did not match the request.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider settings are incomplete.
    #[error("Embedding provider misconfigured: {0}")]
    Misconfigured(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Normalize text before embedding: collapse doubled periods and turn newlines into periods.
pub fn clean_text(text: &str) -> String {
    text.replace("..", ".")
        .replace(". .", ".")
        .replace('\n', ".")
}

/// Build the embedding client selected by configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let (provider, model) = config
        .require_embedding()
        .map_err(|error| EmbeddingClientError::Misconfigured(error.to_string()))?;
    let client: Arc<dyn EmbeddingClient> = match provider {
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
        EmbeddingProvider::Ollama => {
            let base_url = config
                .ollama_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            Arc::new(OllamaEmbeddingClient::new(base_url, model.to_string())?)
        }
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::Misconfigured("OPENAI_API_KEY is not set".into())
            })?;
            let base_url = config
                .openai_api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string());
            Arc::new(OpenAiEmbeddingClient::new(
                base_url,
                api_key,
                model.to_string(),
                Some(config.embedding_dimension),
            )?)
        }
    };
    tracing::debug!(
        ?provider,
        model,
        dimension = config.embedding_dimension,
        "Built embedding client"
    );
    Ok(client)
}
