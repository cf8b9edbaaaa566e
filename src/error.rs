//! Error types for cache operations
//!
//! This module defines custom error types for the rescache library,
//! covering store access, serialization and configuration failures.
//! Upstream fetch failures never appear here: `ResultCache::intercept`
//! is generic over the pipeline's own error type and propagates it
//! untouched.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent in the backing store - drives the miss path
    #[error("key not found")]
    NotFound,

    /// Serialization/Deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend-specific store failure (connectivity, capacity, ...)
    #[error("store error: {0}")]
    Store(String),

    /// Configuration error - the cache layer cannot be constructed
    #[error("configuration error: {0}")]
    Config(String),

    /// Key rejected by the store (e.g. contains the tag-list delimiter)
    #[error("invalid key `{key}`: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The bounded store cannot make room for the entry
    #[error("cache capacity exceeded")]
    CapacityExceeded,
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Whether this error is the not-found condition that drives a miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound)
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Store(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Store(s.to_string())
    }
}
