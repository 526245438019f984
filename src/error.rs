//! Failure taxonomy for the index and generation pipelines.
//!
//! Index build failures are contained by the [`crate::index::IndexManager`]
//! (it falls back to an empty index); generation failures surface to the
//! HTTP caller as a single error. Per-file I/O problems during scanning and
//! loading are logged and skipped and never reach these types.

use std::path::PathBuf;
use thiserror::Error;

/// Failure inside the vector index pipeline.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding a document chunk failed during a rebuild.
    #[error("embedding failed while indexing {}: {source}", path.display())]
    Embedding {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    /// Embedding the search query failed at retrieval time.
    #[error("embedding failed for query: {0}")]
    Query(#[source] anyhow::Error),
}

/// Failure in the answer pipeline. Nothing is persisted when one of these
/// is returned.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("failed to load conversation history: {0}")]
    History(#[from] sqlx::Error),
    #[error("model invocation failed: {0}")]
    Model(#[source] anyhow::Error),
    #[error("failed to persist conversation turns: {0}")]
    Persist(#[source] sqlx::Error),
}
