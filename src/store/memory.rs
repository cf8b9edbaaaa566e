//! Bounded in-process reference backend
//!
//! A single memory region holds both data entries and tag records, guarded
//! by one `RwLock`. The region is bounded by entry count and total byte
//! size with least-recently-used eviction, and entries expire with
//! whole-second TTL granularity.
//!
//! Tag records live in the same region as ordinary entries: a tag's value
//! is its member keys joined by `,`. Because every tag read-modify-write
//! runs under the region's write lock, concurrent tag mutations cannot lose
//! updates.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::store::Store;

/// Delimiter joining member keys inside a tag record. Member keys must not
/// contain it; `add_tag_member` rejects offenders.
const TAG_DELIMITER: char = ',';

/// Default region capacity: 100 MiB
const DEFAULT_MAX_SIZE_BYTES: usize = 100 * 1024 * 1024;

/// Default entry count bound
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// In-process [`Store`] implementation backed by a bounded memory region.
pub struct MemoryStore {
    max_entries: usize,
    max_size_bytes: usize,
    region: RwLock<Region>,
}

/// Internal region state
struct Region {
    /// Main storage: key -> entry (data entries and tag records alike)
    entries: HashMap<String, Entry>,

    /// LRU tracking: maintains access order, least recent at the front
    lru_queue: VecDeque<String>,

    /// Total size of stored data in bytes
    current_size_bytes: usize,

    /// Hit/miss/eviction counters
    stats: MemoryStoreStats,
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
    size_bytes: usize,
}

impl Entry {
    fn new(key: &str, value: Vec<u8>, ttl: Duration) -> Self {
        let size_bytes = key.len() + value.len();
        Self {
            value,
            expires_at: expiry_after(ttl),
            size_bytes,
        }
    }

    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }
}

/// Expiration instant for a TTL. Zero means no expiry; positive sub-second
/// TTLs round up to the next whole second so they cannot silently become
/// immortal.
fn expiry_after(ttl: Duration) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }

    let mut seconds = ttl.as_secs() as i64;
    if ttl.subsec_nanos() > 0 {
        seconds += 1;
    }
    Some(Utc::now() + chrono::Duration::seconds(seconds))
}

impl Region {
    /// Remove an entry, keeping LRU order and size accounting consistent.
    fn remove_entry(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.lru_queue.retain(|k| k != key);
        self.current_size_bytes = self.current_size_bytes.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    /// Move a key to the most-recently-used end of the queue.
    fn touch(&mut self, key: &str) {
        self.lru_queue.retain(|k| k != key);
        self.lru_queue.push_back(key.to_string());
    }

    /// Read a live entry's bytes, lazily removing it when expired.
    fn live_value(&mut self, key: &str) -> Option<Vec<u8>> {
        let expired = self.entries.get(key)?.is_expired();
        if expired {
            debug!("entry expired: {}", key);
            self.remove_entry(key);
            self.stats.evictions_ttl += 1;
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }
}

impl MemoryStore {
    /// Create a store with the default bounds (100 MiB, 10,000 entries).
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_ENTRIES, DEFAULT_MAX_SIZE_BYTES)
    }

    /// Create a store bounded by total byte size only.
    pub fn with_capacity(max_size_bytes: usize) -> Self {
        Self::with_limits(usize::MAX, max_size_bytes)
    }

    /// Create a store with explicit entry-count and byte-size bounds.
    pub fn with_limits(max_entries: usize, max_size_bytes: usize) -> Self {
        info!(
            "initializing memory store (max_entries: {}, max_size_bytes: {})",
            max_entries, max_size_bytes
        );

        Self {
            max_entries,
            max_size_bytes,
            region: RwLock::new(Region {
                entries: HashMap::new(),
                lru_queue: VecDeque::new(),
                current_size_bytes: 0,
                stats: MemoryStoreStats::default(),
            }),
        }
    }

    /// Number of entries currently held, tag records included.
    pub async fn len(&self) -> usize {
        let region = self.region.read().await;
        region.entries.len()
    }

    /// Whether the region holds no entries at all.
    pub async fn is_empty(&self) -> bool {
        let region = self.region.read().await;
        region.entries.is_empty()
    }

    /// Snapshot of the store's counters.
    pub async fn stats(&self) -> MemoryStoreStats {
        let region = self.region.read().await;
        let mut stats = region.stats.clone();
        stats.entries = region.entries.len();
        stats.size_bytes = region.current_size_bytes;
        stats
    }

    /// Remove every expired entry, returning how many were dropped.
    ///
    /// `get` already removes expired entries lazily; this sweep reclaims
    /// entries nobody asks for again. Suitable for a periodic task.
    pub async fn purge_expired(&self) -> usize {
        let mut region = self.region.write().await;

        let expired: Vec<String> = region
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            region.remove_entry(key);
        }
        region.stats.evictions_ttl += expired.len() as u64;

        if !expired.is_empty() {
            debug!("purged {} expired entries", expired.len());
        }
        expired.len()
    }

    /// Insert under the region lock, evicting LRU entries to stay within
    /// bounds. Replacing an existing key reclaims its size first.
    fn put(&self, region: &mut Region, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let entry = Entry::new(key, value, ttl);

        if entry.size_bytes > self.max_size_bytes {
            return Err(CacheError::CapacityExceeded);
        }

        region.remove_entry(key);

        // Evict from the least-recently-used end until the entry fits
        while region.entries.len() >= self.max_entries
            || region.current_size_bytes + entry.size_bytes > self.max_size_bytes
        {
            match region.lru_queue.front().cloned() {
                Some(victim) => {
                    debug!("evicting entry to make room: {}", victim);
                    region.remove_entry(&victim);
                    region.stats.evictions_size += 1;
                }
                None => {
                    warn!("cannot evict further, store capacity exceeded");
                    return Err(CacheError::CapacityExceeded);
                }
            }
        }

        region.current_size_bytes += entry.size_bytes;
        region.entries.insert(key.to_string(), entry);
        region.lru_queue.push_back(key.to_string());
        Ok(())
    }

    fn parse_members(bytes: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(bytes);
        if text.is_empty() {
            return Vec::new();
        }
        text.split(TAG_DELIMITER).map(str::to_string).collect()
    }

    fn join_members(members: &[String]) -> Vec<u8> {
        members.join(&TAG_DELIMITER.to_string()).into_bytes()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut region = self.region.write().await;
        self.put(&mut region, key, value.to_vec(), ttl)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut region = self.region.write().await;

        match region.live_value(key) {
            Some(value) => {
                region.stats.hits += 1;
                region.touch(key);
                debug!("cache hit: {}", key);
                Ok(value)
            }
            None => {
                region.stats.misses += 1;
                debug!("cache miss: {}", key);
                Err(CacheError::NotFound)
            }
        }
    }

    async fn add_tag_member(&self, tag: &str, key: &str) -> Result<()> {
        if key.contains(TAG_DELIMITER) {
            return Err(CacheError::InvalidKey {
                key: key.to_string(),
                reason: format!("member keys must not contain `{}`", TAG_DELIMITER),
            });
        }

        let mut region = self.region.write().await;

        let mut members = match region.live_value(tag) {
            Some(bytes) => Self::parse_members(&bytes),
            None => Vec::new(),
        };

        if members.iter().any(|m| m == key) {
            return Ok(());
        }
        members.push(key.to_string());

        // Tag records never expire on their own
        self.put(&mut region, tag, Self::join_members(&members), Duration::ZERO)
    }

    async fn remove_tag_member(&self, tag: &str, key: &str) -> Result<()> {
        let mut region = self.region.write().await;

        let Some(bytes) = region.live_value(tag) else {
            return Ok(());
        };

        let mut members = Self::parse_members(&bytes);
        let before = members.len();
        members.retain(|m| m != key);
        if members.len() == before {
            return Ok(());
        }

        if members.is_empty() {
            region.remove_entry(tag);
            return Ok(());
        }
        self.put(&mut region, tag, Self::join_members(&members), Duration::ZERO)
    }

    async fn is_tag_member(&self, tag: &str, key: &str) -> Result<bool> {
        let mut region = self.region.write().await;

        let Some(bytes) = region.live_value(tag) else {
            return Ok(false);
        };
        Ok(Self::parse_members(&bytes).iter().any(|m| m == key))
    }

    async fn evict_by_tag(&self, tag: &str) -> Result<()> {
        let mut region = self.region.write().await;

        let Some(bytes) = region.live_value(tag) else {
            return Ok(());
        };

        let members = Self::parse_members(&bytes);
        let mut removed = 0usize;
        for member in &members {
            if region.remove_entry(member).is_some() {
                removed += 1;
            }
        }
        region.remove_entry(tag);
        region.stats.invalidations += removed as u64;

        debug!("evicted {} entries under tag: {}", removed, tag);
        Ok(())
    }

    async fn evict_by_key(&self, key: &str) -> Result<()> {
        let mut region = self.region.write().await;

        match region.remove_entry(key) {
            Some(_) => {
                region.stats.invalidations += 1;
                debug!("evicted entry: {}", key);
                Ok(())
            }
            None => Err(CacheError::NotFound),
        }
    }

    async fn clear(&self, keys: &[String]) -> Result<()> {
        let mut region = self.region.write().await;

        if keys.is_empty() {
            let count = region.entries.len();
            region.entries.clear();
            region.lru_queue.clear();
            region.current_size_bytes = 0;
            region.stats.invalidations += count as u64;
            info!("cleared {} entries from store", count);
            return Ok(());
        }

        let mut removed = 0usize;
        for key in keys {
            if region.remove_entry(key).is_some() {
                removed += 1;
            }
        }
        region.stats.invalidations += removed as u64;
        debug!("cleared {} of {} named keys", removed, keys.len());
        Ok(())
    }
}

/// Counters describing store behavior over its lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStoreStats {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Number of entries currently held (snapshot)
    pub entries: usize,

    /// Total size of stored data in bytes (snapshot)
    pub size_bytes: usize,

    /// Evictions forced by capacity bounds
    pub evictions_size: u64,

    /// Evictions caused by TTL expiry
    pub evictions_ttl: u64,

    /// Entries removed by explicit eviction or clear
    pub invalidations: u64,
}

impl MemoryStoreStats {
    /// Cache hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
