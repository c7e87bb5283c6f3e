//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// A missing key is not an error: lookups return `Option` instead.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Negative TTLs are rejected and the write is dropped
    #[error("Invalid TTL: {0} seconds")]
    InvalidTtl(i64),

    /// The index mutation queue is full (non-blocking writes only)
    #[error("Cache overloaded: index mutation queue is full")]
    Overloaded,

    /// The index worker is no longer draining the mutation queue
    #[error("Index worker stopped")]
    WorkerStopped,

    /// The index worker thread could not be started
    #[error("Failed to spawn index worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
