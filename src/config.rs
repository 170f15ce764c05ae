use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the sync pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance backing the search index.
    pub qdrant_url: Option<String>,
    /// Name of the Qdrant collection that stores document sections.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Similarity metric used for both vector fields.
    pub qdrant_distance: VectorDistance,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: Option<EmbeddingProvider>,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: Option<String>,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of an OpenAI-compatible embeddings API.
    pub openai_api_url: Option<String>,
    /// API key for the OpenAI-compatible embeddings API.
    pub openai_api_key: Option<String>,
    /// Base URL of the Ollama runtime.
    pub ollama_url: Option<String>,
    /// Endpoint of the layout extraction service.
    pub layout_endpoint: Option<String>,
    /// API key of the layout extraction service.
    pub layout_api_key: Option<String>,
    /// Layout model identifier.
    pub layout_model: String,
    /// Locale hint forwarded to the layout extraction service.
    pub layout_locale: String,
    /// Delay between two polls of a running extraction job.
    pub layout_poll_interval_ms: u64,
    /// Directory holding sync state, blobs, and queues.
    pub data_dir: PathBuf,
    /// Public base URL serving the blob directory to the layout service.
    pub blob_public_url: Option<String>,
    /// Content roots walked on every sync pass.
    pub roots: Vec<String>,
    /// Token budget per paragraph chunk.
    pub chunk_token_limit: usize,
    /// Overlap budget shared between adjacent chunks and around tables.
    pub chunk_token_overlap: usize,
    /// Minimum number of characters for the trailing chunk to be kept.
    pub chunk_min_size: usize,
    /// Number of documents per index upsert request.
    pub index_batch_size: usize,
    /// Admission ceiling for outstanding work items.
    pub queue_max_documents: usize,
    /// Number of messages inspected when measuring queue depth.
    pub queue_peek_limit: usize,
    /// Seconds a received message stays leased before another worker may take it.
    pub queue_visibility_timeout_secs: u64,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic offline hashing encoder.
    Hashing,
}

/// Similarity metric configured on the index vector fields.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum VectorDistance {
    /// Cosine similarity.
    #[default]
    Cosine,
    /// Dot product.
    Dot,
    /// Euclidean distance.
    Euclid,
}

impl VectorDistance {
    /// Name understood by the Qdrant collection API.
    pub fn as_qdrant_str(self) -> &'static str {
        match self {
            Self::Cosine => "Cosine",
            Self::Dot => "Dot",
            Self::Euclid => "Euclid",
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            qdrant_url: load_env_optional("QDRANT_URL"),
            qdrant_collection_name: load_env_optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "documents".to_string()),
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_distance: load_env_optional("QDRANT_DISTANCE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("QDRANT_DISTANCE".into()))
                })
                .transpose()?
                .unwrap_or_default(),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?,
            embedding_model: load_env_optional("EMBEDDING_MODEL"),
            embedding_dimension: parse_optional("EMBEDDING_DIMENSION")?.unwrap_or(3072),
            openai_api_url: load_env_optional("OPENAI_API_URL"),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            ollama_url: load_env_optional("OLLAMA_URL"),
            layout_endpoint: load_env_optional("LAYOUT_ENDPOINT"),
            layout_api_key: load_env_optional("LAYOUT_API_KEY"),
            layout_model: load_env_optional("LAYOUT_MODEL")
                .unwrap_or_else(|| "prebuilt-layout".to_string()),
            layout_locale: load_env_optional("LAYOUT_LOCALE")
                .unwrap_or_else(|| "es-ES".to_string()),
            layout_poll_interval_ms: parse_optional("LAYOUT_POLL_INTERVAL_MS")?.unwrap_or(2000),
            data_dir: load_env_optional("DOCSYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            blob_public_url: load_env_optional("BLOB_PUBLIC_URL"),
            roots: load_env_optional("DOCSYNC_ROOTS")
                .map(|value| split_list(&value))
                .unwrap_or_default(),
            chunk_token_limit: parse_optional("CHUNK_TOKEN_LIMIT")?.unwrap_or(2048),
            chunk_token_overlap: parse_optional("CHUNK_TOKEN_OVERLAP")?.unwrap_or(200),
            chunk_min_size: parse_optional("CHUNK_MIN_SIZE")?.unwrap_or(100),
            index_batch_size: parse_optional("INDEX_BATCH_SIZE")?.unwrap_or(1000),
            queue_max_documents: parse_optional("QUEUE_MAX_DOCUMENTS")?.unwrap_or(5),
            queue_peek_limit: parse_optional("QUEUE_PEEK_LIMIT")?.unwrap_or(10),
            queue_visibility_timeout_secs: parse_optional("QUEUE_VISIBILITY_TIMEOUT_SECS")?
                .unwrap_or(3600),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }

    /// Qdrant base URL; only the index client needs it.
    pub fn require_qdrant_url(&self) -> Result<&str, ConfigError> {
        self.qdrant_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("QDRANT_URL".into()))
    }

    /// Embedding provider and model; only the worker needs them.
    pub fn require_embedding(&self) -> Result<(EmbeddingProvider, &str), ConfigError> {
        let provider = self
            .embedding_provider
            .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_PROVIDER".into()))?;
        let model = self
            .embedding_model
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_MODEL".into()))?;
        Ok((provider, model))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "azure" => Ok(Self::OpenAI),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for VectorDistance {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dotproduct" => Ok(Self::Dot),
            "euclid" | "euclidean" => Ok(Self::Euclid),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = ?config.qdrant_url,
        collection = %config.qdrant_collection_name,
        data_dir = %config.data_dir.display(),
        roots = config.roots.len(),
        embedding_provider = ?config.embedding_provider,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
