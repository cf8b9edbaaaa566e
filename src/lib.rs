//! # rescache
//!
//! A transparent, pluggable result-cache for query-execution pipelines.
//!
//! ## Features
//!
//! - **Opt-in per request**: a TTL hint activates caching; without one the
//!   layer is a pure pass-through
//! - **Deterministic keys**: 64-bit fingerprint of the literal query text,
//!   base-36 encoded under a configurable namespace prefix
//! - **Write-through on miss**: fetched results are cached for the next
//!   identical request
//! - **Tag-based bulk invalidation**: entries registered under a tag are
//!   evicted together in one call
//! - **Pluggable backends**: one [`Store`] trait, independent
//!   implementations; a bounded in-process [`MemoryStore`] ships as the
//!   reference backend
//! - **Optional miss coalescing**: single-flight per key when enabled
//!
//! Caching is strictly an optimization layer: cache write failures are
//! logged and swallowed inside the read path, and a read that would succeed
//! against the real data source succeeds even with the cache unavailable.
//!
//! ## Example
//!
//! ```rust
//! use rescache::{CacheConfig, MemoryStore, ReadOptions, ResultCache};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let cache = ResultCache::new(
//!     CacheConfig::builder()
//!         .store(MemoryStore::new())
//!         .prefix("app:")
//!         .build(),
//! )?;
//!
//! let options = ReadOptions::new()
//!     .ttl(Duration::from_secs(60))
//!     .tag("users");
//!
//! // First call misses and runs the real fetch; the result is cached
//! let names: Vec<String> = cache
//!     .intercept("SELECT name FROM users", &options, || async {
//!         Ok::<_, anyhow::Error>(vec!["alice".to_string(), "bob".to_string()])
//!     })
//!     .await?;
//! assert_eq!(names.len(), 2);
//!
//! // Later: users changed, drop every entry registered under the tag
//! cache.evict_tag("users").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod layer;
pub mod serializer;
pub mod store;

mod singleflight;

// Re-export main types for convenience
pub use config::{CacheConfig, CacheConfigBuilder};
pub use error::{CacheError, Result};
pub use key::{derive_key, fingerprint};
pub use layer::{ReadOptions, ResultCache};
pub use serializer::{JsonSerializer, Serializer};
pub use store::{MemoryStore, MemoryStoreStats, Store};
