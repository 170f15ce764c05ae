//! Queue worker that reconciles pending files with the search index.

mod service;
pub mod types;

pub use service::{
    Collaborators, DocumentProcessor, ProcessorSettings, RECOGNIZED_CONTAINER, STAGING_CONTAINER,
};
pub use types::{ProcessOutcome, ProcessingError, WorkerReport};
