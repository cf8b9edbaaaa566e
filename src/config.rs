//! Configuration for the cache layer
//!
//! A [`CacheConfig`] names the backing store (required), the key namespace
//! prefix, the serializer and the optional hardening knobs. Construction of
//! the cache layer validates the configuration and returns an error instead
//! of terminating the process: a missing store is a recoverable
//! misconfiguration, not a crash.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CacheError, Result};
use crate::serializer::{JsonSerializer, Serializer};
use crate::store::Store;

/// Configuration for a [`ResultCache`](crate::ResultCache)
pub struct CacheConfig<S: Serializer = JsonSerializer> {
    /// Backing store. Required; validation fails without one.
    pub store: Option<Arc<dyn Store>>,

    /// Namespace prepended to every derived cache key
    pub prefix: String,

    /// Value codec
    pub serializer: S,

    /// TTL jitter factor (0.0 - 1.0)
    ///
    /// Adds random variation to write-back TTLs so entries cached together
    /// do not all expire together. 0.0 disables jitter.
    pub ttl_jitter: f64,

    /// Serialize concurrent misses per key (single-flight)
    ///
    /// When false, N concurrent misses on one key each fetch upstream and
    /// the last write wins. When true, the first miss fetches while
    /// followers wait and then read the freshly cached result.
    pub coalesce_misses: bool,
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

impl<S: Serializer> CacheConfig<S> {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.store.is_none() {
            return Err(CacheError::Config("no backing store supplied".to_string()));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Apply the configured jitter to a request TTL.
    pub fn ttl_with_jitter(&self, ttl: Duration) -> Duration {
        if self.ttl_jitter == 0.0 || ttl.is_zero() {
            return ttl;
        }

        let base_secs = ttl.as_secs_f64();
        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        let final_secs = (base_secs + jitter).max(1.0);

        Duration::from_secs_f64(final_secs)
    }
}

impl<S: Serializer + fmt::Debug> fmt::Debug for CacheConfig<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("store", &self.store.as_ref().map(|_| "dyn Store"))
            .field("prefix", &self.prefix)
            .field("serializer", &self.serializer)
            .field("ttl_jitter", &self.ttl_jitter)
            .field("coalesce_misses", &self.coalesce_misses)
            .finish()
    }
}

/// Builder for cache configuration
pub struct CacheConfigBuilder<S: Serializer = JsonSerializer> {
    store: Option<Arc<dyn Store>>,
    prefix: Option<String>,
    serializer: S,
    ttl_jitter: Option<f64>,
    coalesce_misses: Option<bool>,
}

impl Default for CacheConfigBuilder {
    fn default() -> Self {
        Self {
            store: None,
            prefix: None,
            serializer: JsonSerializer,
            ttl_jitter: None,
            coalesce_misses: None,
        }
    }
}

impl<S: Serializer> CacheConfigBuilder<S> {
    /// Set the backing store
    pub fn store<St: Store + 'static>(mut self, store: St) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a backing store shared with other owners
    pub fn shared_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the key namespace prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Replace the default JSON codec
    pub fn serializer<S2: Serializer>(self, serializer: S2) -> CacheConfigBuilder<S2> {
        CacheConfigBuilder {
            store: self.store,
            prefix: self.prefix,
            serializer,
            ttl_jitter: self.ttl_jitter,
            coalesce_misses: self.coalesce_misses,
        }
    }

    /// Set the TTL jitter factor (0.0 - 1.0)
    pub fn ttl_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = Some(jitter);
        self
    }

    /// Enable or disable single-flight miss coalescing
    pub fn coalesce_misses(mut self, enable: bool) -> Self {
        self.coalesce_misses = Some(enable);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig<S> {
        CacheConfig {
            store: self.store,
            prefix: self.prefix.unwrap_or_default(),
            serializer: self.serializer,
            ttl_jitter: self.ttl_jitter.unwrap_or(0.0),
            coalesce_misses: self.coalesce_misses.unwrap_or(false),
        }
    }
}
