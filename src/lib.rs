#![deny(missing_docs)]

//! Incremental document sync: change detection over content trees, table-aware chunking of
//! layout extraction results, and synchronization of a vector search index.

/// HTTP routing and trigger handlers.
pub mod api;
/// Table-aware chunking of extraction results.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Layout extraction client and result model.
pub mod extraction;
/// Vector search index integration.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline counters.
pub mod metrics;
/// Wiring of sync and processing behind one trigger surface.
pub mod pipeline;
/// Queue worker reconciling files with the index.
pub mod processing;
/// Blob storage and work queues.
pub mod storage;
/// Change detection, sync state, and queue admission.
pub mod sync;
