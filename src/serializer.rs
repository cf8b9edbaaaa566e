//! Pluggable value serialization
//!
//! The cache layer never hands in-memory values to a store directly: every
//! value crosses this boundary and stores only ever see opaque bytes. The
//! default codec is JSON via serde_json; alternative codecs plug in by
//! implementing [`Serializer`] and selecting it on the configuration
//! builder.

use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Converts in-memory result values to and from a byte encoding.
///
/// Deserialization constructs a fresh value: the destination is overwritten
/// wholesale, never merged with prior state.
pub trait Serializer: Send + Sync {
    /// Encode a value to bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Decode a value from bytes.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Default structured text codec (JSON)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
