//! Error types.

use thiserror::Error;

/// Result type for cache collaborator operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors raised by the cache store or the serializer.
///
/// These never reach the caller of a query; the cache logs them and falls
/// back to uncached behavior.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failed to serialize/deserialize a cached value.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The eviction worker is no longer running.
    #[error("eviction worker stopped")]
    WorkerStopped,
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Errors produced by the wrapped query executor.
///
/// `Clone` so one failed execution can be handed to every coalesced caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The underlying query failed.
    #[error("query execution failed: {0}")]
    Execution(String),

    /// No rows matched when one was expected.
    #[error("record not found")]
    NotFound,

    /// The execution stopped before producing a result (e.g. the executor panicked).
    #[error("query aborted: {0}")]
    Aborted(String),
}

impl QueryError {
    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}
