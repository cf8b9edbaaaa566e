//! Abstract storage contract for cache backends
//!
//! A [`Store`] is a key/value backend with per-entry TTL and a parallel
//! tag-membership index. The cache layer drives it exclusively through this
//! trait, so backends (in-process, remote, ...) are interchangeable. Values
//! are always opaque bytes: serialization happens above this boundary, and a
//! store must never special-case value types.
//!
//! Cancellation follows the usual async contract: every operation is an
//! `async fn`, and dropping the returned future abandons the call. A purely
//! in-memory backend can only observe cancellation at call entry; backends
//! performing real I/O must keep each I/O step behind an `.await` so a
//! deadline or drop cancels promptly.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

pub mod memory;

pub use memory::{MemoryStore, MemoryStoreStats};

/// Capacity-agnostic key/value backend with TTL support and tag membership.
///
/// # Concurrency
///
/// Implementations are the sole synchronization boundary: tag membership
/// updates are read-modify-write sequences and MUST be serialized per tag
/// (or coarser) so concurrent `add_tag_member`/`remove_tag_member` calls on
/// the same tag cannot lose updates.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store bytes under `key`, expiring after `ttl`.
    ///
    /// A zero `ttl` means the entry never expires.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Fetch the bytes stored under `key`.
    ///
    /// Absence (including expiry) is [`CacheError::NotFound`], which drives
    /// the caller's miss path rather than a hard failure.
    ///
    /// [`CacheError::NotFound`]: crate::error::CacheError::NotFound
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Register `key` as a member of `tag`, creating the tag lazily.
    ///
    /// Set semantics: a key appears in a tag at most once, and registering
    /// an existing member is a no-op.
    async fn add_tag_member(&self, tag: &str, key: &str) -> Result<()>;

    /// Remove `key` from `tag`'s member set.
    ///
    /// Removing a non-member (or from an unknown tag) is a no-op.
    async fn remove_tag_member(&self, tag: &str, key: &str) -> Result<()>;

    /// Whether `key` is currently a member of `tag`.
    ///
    /// An unknown tag reports `false`.
    async fn is_tag_member(&self, tag: &str, key: &str) -> Result<bool>;

    /// Remove every entry registered under `tag`, and the tag record itself.
    ///
    /// An unknown tag is a no-op.
    async fn evict_by_tag(&self, tag: &str) -> Result<()>;

    /// Remove the single entry stored under `key`.
    ///
    /// Tag membership lists referencing `key` are left untouched and go
    /// stale. A missing key is [`CacheError::NotFound`].
    ///
    /// [`CacheError::NotFound`]: crate::error::CacheError::NotFound
    async fn evict_by_key(&self, key: &str) -> Result<()>;

    /// Remove the named keys, or wipe the entire store when `keys` is empty.
    ///
    /// The full wipe removes data entries and tag records alike.
    async fn clear(&self, keys: &[String]) -> Result<()>;
}
