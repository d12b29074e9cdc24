//! Error types for the pipeline.

use thiserror::Error;

/// Errors that can occur inside pipeline operations.
///
/// Note that most failures never reach the caller as errors: transport,
/// validation, and persistence failures are absorbed into the dead-letter
/// sink by policy. What remains here are the failures of the absorption
/// machinery itself (sink writes, pool checkout, task joins).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A hot-store or dead-letter operation failed.
    #[error("pipeline store error: {0}")]
    Store(#[from] streamlens_store::StoreError),

    /// JSON serialization or deserialization failed.
    #[error("pipeline serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Checking out a database connection failed.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
