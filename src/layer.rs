//! Cache orchestration layer
//!
//! [`ResultCache`] sits in front of a query-execution pipeline as a
//! replaceable read step. Callers opt into caching per request through
//! [`ReadOptions`]; without a TTL hint the layer is a transparent
//! pass-through. On a miss the layer runs the pipeline's real fetch and
//! writes the result through to the store, optionally registering the key
//! under a tag for bulk invalidation later.
//!
//! Caching is strictly an optimization: a read that would succeed against
//! the real data source succeeds even if the entire cache subsystem is
//! unavailable. Only the upstream fetch can fail an intercepted read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::key;
use crate::serializer::{JsonSerializer, Serializer};
use crate::singleflight::KeyLocks;
use crate::store::Store;

/// Per-request caching hints, passed explicitly alongside the request.
///
/// Absence of a TTL (or a zero TTL) disables caching for the request and
/// forces pass-through.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Cache the result for this long. Presence activates caching.
    pub ttl: Option<Duration>,

    /// Explicit cache key, bypassing fingerprint derivation
    pub key: Option<String>,

    /// Register the resulting entry under this tag after a successful fetch
    pub tag: Option<String>,
}

impl ReadOptions {
    /// Options with no hints set: a pass-through request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache the result for `ttl`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Use `key` instead of deriving one from the query text.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Register the entry under `tag`.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn cache_ttl(&self) -> Option<Duration> {
        match self.ttl {
            Some(ttl) if !ttl.is_zero() => Some(ttl),
            _ => None,
        }
    }
}

/// Transparent result cache in front of a query-execution pipeline.
pub struct ResultCache<S: Serializer = JsonSerializer> {
    store: Arc<dyn Store>,
    config: CacheConfig<S>,
    flights: KeyLocks,
}

impl<S: Serializer> std::fmt::Debug for ResultCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").finish_non_exhaustive()
    }
}

impl<S: Serializer> ResultCache<S> {
    /// Construct the cache layer from a validated configuration.
    ///
    /// Returns [`CacheError::Config`] when no store is supplied instead of
    /// failing per-call later.
    pub fn new(config: CacheConfig<S>) -> Result<Self> {
        config.validate()?;
        let store = config
            .store
            .clone()
            .ok_or_else(|| CacheError::Config("no backing store supplied".to_string()))?;

        Ok(Self {
            store,
            config,
            flights: KeyLocks::new(),
        })
    }

    /// The backing store this layer reads and writes through.
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// The cache key `intercept` would use for `query` without an explicit
    /// key hint.
    pub fn derive_key(&self, query: &str) -> String {
        key::derive_key(&self.config.prefix, query)
    }

    /// Serve a pipeline read from the cache, or fall through to `fetch`.
    ///
    /// `query` is the literal text of the request, used for fingerprinting;
    /// `fetch` performs the real upstream read. Control flow:
    ///
    /// - no TTL hint: `fetch` runs unmodified, nothing is cached.
    /// - hit: the cached value is returned and `fetch` never runs.
    /// - miss (or unreadable cached bytes): `fetch` runs; its error, if
    ///   any, propagates untouched and is never cached. On success the
    ///   value is written through and optionally tagged; failures of those
    ///   writes are logged and swallowed.
    pub async fn intercept<T, E, F, Fut>(
        &self,
        query: &str,
        options: &ReadOptions,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        // Caching is opt-in per request, not global
        let Some(ttl) = options.cache_ttl() else {
            return fetch().await;
        };

        let key = match &options.key {
            Some(key) => key.clone(),
            None => self.derive_key(query),
        };

        if self.config.coalesce_misses {
            let _flight = self.flights.acquire(&key).await;
            self.read_through(&key, ttl, options.tag.as_deref(), fetch)
                .await
        } else {
            self.read_through(&key, ttl, options.tag.as_deref(), fetch)
                .await
        }
    }

    async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tag: Option<&str>,
        fetch: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        match self.lookup::<T>(key).await {
            Ok(value) => {
                debug!("serving cached result: {}", key);
                return Ok(value);
            }
            Err(CacheError::NotFound) => {}
            // Unreadable cached bytes fall through to a genuine fetch
            Err(e) => warn!("cache read failed, treating as miss: {}: {}", key, e),
        }

        let value = fetch().await?;

        let ttl = self.config.ttl_with_jitter(ttl);
        if let Err(e) = self.save(key, &value, ttl).await {
            // A cache-write failure must never fail the read
            warn!("cache write failed: {}: {}", key, e);
            return Ok(value);
        }

        if let Some(tag) = tag {
            if let Err(e) = self.store.add_tag_member(tag, key).await {
                warn!("tag registration failed: {} under {}: {}", key, tag, e);
            }
        }

        Ok(value)
    }

    /// Fetch and deserialize the entry under `key`.
    ///
    /// Absence surfaces as [`CacheError::NotFound`]; this method never
    /// falls through to the upstream - that is `intercept`'s job. The
    /// destination is constructed wholesale from the cached bytes, so no
    /// stale state (scalar or otherwise) survives a lookup.
    pub async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let bytes = self.store.get(key).await?;
        self.config.serializer.deserialize(&bytes)
    }

    /// Serialize `value` and store it under `key` with the given TTL.
    pub async fn save<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let bytes = self.config.serializer.serialize(value)?;
        self.store.set(key, &bytes, ttl).await
    }

    /// Register `key` under `tag`.
    pub async fn add_tag_member(&self, tag: &str, key: &str) -> Result<()> {
        self.store.add_tag_member(tag, key).await
    }

    /// Remove `key` from `tag`'s member set.
    pub async fn remove_tag_member(&self, tag: &str, key: &str) -> Result<()> {
        self.store.remove_tag_member(tag, key).await
    }

    /// Whether `key` is registered under `tag`.
    pub async fn is_tag_member(&self, tag: &str, key: &str) -> Result<bool> {
        self.store.is_tag_member(tag, key).await
    }

    /// Evict every entry registered under `tag`, and the tag itself.
    pub async fn evict_tag(&self, tag: &str) -> Result<()> {
        self.store.evict_by_tag(tag).await
    }

    /// Evict the single entry under `key`, leaving tag lists untouched.
    pub async fn evict_key(&self, key: &str) -> Result<()> {
        self.store.evict_by_key(key).await
    }

    /// Clear the named keys, or everything when `keys` is empty.
    pub async fn clear(&self, keys: &[String]) -> Result<()> {
        self.store.clear(keys).await
    }
}
