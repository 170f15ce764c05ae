//! Turning extraction results into retrievable sections.

pub mod engine;
pub mod section;
pub mod table;
pub mod tokenizer;

pub use engine::{ChunkingEngine, ChunkingOptions, TOKENS_PER_WORD};
pub use section::{Section, sanitize_id, section_id};
pub use tokenizer::{TokenCounter, build_token_counter, whitespace_counter};

use anyhow::Error as TokenizerError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while configuring the chunking engine.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The token budget must allow at least one token.
    #[error("chunk token limit must be greater than zero")]
    InvalidTokenLimit,
    /// The tokens-per-word ratio must be positive.
    #[error("tokens per word must be positive, got {0}")]
    InvalidTokensPerWord(f64),
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
    /// The embedding model that selects the tokenizer is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
