//! Integration tests for the cache layer
//!
//! These tests drive the full read path the way a query pipeline would:
//! - hit/miss/write-back protocol with a counting upstream
//! - fingerprint-derived and explicit keys
//! - tag registration and bulk invalidation
//! - documented staleness after direct key eviction
//! - concurrent misses with and without coalescing
//! - failure isolation (upstream errors, unavailable cache subsystem)

use rescache::{CacheConfig, CacheError, MemoryStore, ReadOptions, ResultCache, Store};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Row {
    id: i64,
    name: String,
}

/// Upstream stand-in that counts how many times it is invoked.
struct Upstream {
    calls: AtomicUsize,
    rows: Vec<Row>,
}

impl Upstream {
    fn new(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            rows,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn fetch(self: Arc<Self>) -> Result<Vec<Row>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.clone())
    }
}

fn new_cache(store: Arc<MemoryStore>) -> ResultCache {
    ResultCache::new(
        CacheConfig::builder()
            .shared_store(store)
            .prefix("app:")
            .build(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_first_call_fetches_second_call_hits() {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let upstream = Upstream::new(vec![Row {
        id: 1,
        name: "alice".to_string(),
    }]);
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let first: Vec<Row> = cache
        .intercept("SELECT * FROM users", &options, {
            let upstream = upstream.clone();
            move || upstream.fetch()
        })
        .await
        .unwrap();
    assert_eq!(upstream.calls(), 1);

    // The entry landed under the derived key
    let key = cache.derive_key("SELECT * FROM users");
    assert!(key.starts_with("app:"));
    assert!(store.get(&key).await.is_ok());

    // An identical second call never reaches the upstream and returns
    // identical content
    let second: Vec<Row> = cache
        .intercept("SELECT * FROM users", &options, {
            let upstream = upstream.clone();
            move || upstream.fetch()
        })
        .await
        .unwrap();
    assert_eq!(upstream.calls(), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_select_one_scenario() {
    // TTL=60s, prefix="app:", query "SELECT 1"
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let fetch = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<i64, String>(1)
        }
    };

    let first = cache
        .intercept("SELECT 1", &options, fetch(calls.clone()))
        .await
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let key = cache.derive_key("SELECT 1");
    assert_eq!(key, format!("app:{}", rescache::fingerprint("SELECT 1")));
    assert!(store.get(&key).await.is_ok());

    let second = cache
        .intercept("SELECT 1", &options, fetch(calls.clone()))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_different_queries_use_different_keys() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let one: i64 = cache
        .intercept("SELECT 1", &options, || async { Ok::<_, String>(1) })
        .await
        .unwrap();
    let two: i64 = cache
        .intercept("SELECT 2", &options, || async { Ok::<_, String>(2) })
        .await
        .unwrap();

    assert_eq!(one, 1);
    assert_eq!(two, 2);
    assert_ne!(
        cache.derive_key("SELECT 1"),
        cache.derive_key("SELECT 2")
    );
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_tag_invalidation_scenario() {
    // Tag "users", keys "app:k1"/"app:k2": evicting the tag removes the
    // entries and the membership
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());

    cache
        .save("app:k1", &"v1".to_string(), Duration::from_secs(60))
        .await
        .unwrap();
    cache
        .save("app:k2", &"v2".to_string(), Duration::from_secs(60))
        .await
        .unwrap();
    cache.add_tag_member("users", "app:k1").await.unwrap();
    cache.add_tag_member("users", "app:k2").await.unwrap();

    cache.evict_tag("users").await.unwrap();

    assert!(!cache.is_tag_member("users", "app:k1").await.unwrap());
    assert!(store.get("app:k1").await.unwrap_err().is_not_found());
    assert!(store.get("app:k2").await.unwrap_err().is_not_found());
    assert!(cache
        .lookup::<String>("app:k1")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_direct_eviction_leaves_tag_membership_stale() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());

    cache
        .save("app:k1", &"v1".to_string(), Duration::from_secs(60))
        .await
        .unwrap();
    cache.add_tag_member("users", "app:k1").await.unwrap();

    cache.evict_key("app:k1").await.unwrap();

    // The entry is gone, but the tag still claims it: the documented
    // inconsistency, asserted on purpose
    assert!(cache
        .lookup::<String>("app:k1")
        .await
        .unwrap_err()
        .is_not_found());
    assert!(cache.is_tag_member("users", "app:k1").await.unwrap());
}

#[tokio::test]
async fn test_intercepted_entries_evictable_by_tag() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let upstream = Upstream::new(vec![Row {
        id: 1,
        name: "alice".to_string(),
    }]);
    let options = ReadOptions::new()
        .ttl(Duration::from_secs(60))
        .tag("users");

    let _: Vec<Row> = cache
        .intercept("SELECT * FROM users", &options, {
            let upstream = upstream.clone();
            move || upstream.fetch()
        })
        .await
        .unwrap();
    assert_eq!(upstream.calls(), 1);

    cache.evict_tag("users").await.unwrap();

    // The next identical call misses again
    let _: Vec<Row> = cache
        .intercept("SELECT * FROM users", &options, {
            let upstream = upstream.clone();
            move || upstream.fetch()
        })
        .await
        .unwrap();
    assert_eq!(upstream.calls(), 2);
}

#[tokio::test]
async fn test_ttl_expiry_forces_refetch() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let options = ReadOptions::new().ttl(Duration::from_secs(1));

    let fetch = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<i64, String>(1)
        }
    };

    cache
        .intercept("SELECT 1", &options, fetch(calls.clone()))
        .await
        .unwrap();
    cache
        .intercept("SELECT 1", &options, fetch(calls.clone()))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1200)).await;

    cache
        .intercept("SELECT 1", &options, fetch(calls.clone()))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_selective_clear_via_layer() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());

    cache
        .save("app:k1", &1i64, Duration::from_secs(60))
        .await
        .unwrap();
    cache
        .save("app:k2", &2i64, Duration::from_secs(60))
        .await
        .unwrap();

    cache.clear(&["app:k1".to_string()]).await.unwrap();
    assert!(cache
        .lookup::<i64>("app:k1")
        .await
        .unwrap_err()
        .is_not_found());
    assert_eq!(cache.lookup::<i64>("app:k2").await.unwrap(), 2);

    cache.clear(&[]).await.unwrap();
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_stampede_without_coalescing() {
    // Base design: concurrent misses may each reach the upstream; the
    // last writer wins and the value still ends up cached
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(new_cache(store.clone()));
    let calls = Arc::new(AtomicUsize::new(0));
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let options = options.clone();
            tokio::spawn(async move {
                cache
                    .intercept("SELECT 1", &options, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<i64, String>(1)
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }

    let fetched = calls.load(Ordering::SeqCst);
    assert!((1..=10).contains(&fetched));
    assert_eq!(cache.lookup::<i64>(&cache.derive_key("SELECT 1")).await.unwrap(), 1);
}

#[tokio::test]
async fn test_coalesced_misses_fetch_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(
        ResultCache::new(
            CacheConfig::builder()
                .shared_store(store)
                .prefix("app:")
                .coalesce_misses(true)
                .build(),
        )
        .unwrap(),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            let options = options.clone();
            tokio::spawn(async move {
                cache
                    .intercept("SELECT 1", &options, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<i64, String>(1)
                    })
                    .await
                    .unwrap()
            })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    for result in results {
        assert_eq!(result.unwrap(), 1);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_upstream_failure_propagates_verbatim() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let options = ReadOptions::new().ttl(Duration::from_secs(60));

    let result: Result<i64, String> = cache
        .intercept("SELECT 1", &options, || async {
            Err("connection reset".to_string())
        })
        .await;

    assert_eq!(result.unwrap_err(), "connection reset");
    // A failed fetch is never cached; the next call reaches the upstream
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let value = cache
        .intercept("SELECT 1", &options, move || async move {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok::<i64, String>(5)
        })
        .await
        .unwrap();
    assert_eq!(value, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pass_through_when_no_hint() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store.clone());
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        let value: i64 = cache
            .intercept("SELECT 1", &ReadOptions::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            })
            .await
            .unwrap();
        assert_eq!(value, 1);
    }

    // Every call went upstream and nothing was cached
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_comma_member_key_rejected_via_layer() {
    let store = Arc::new(MemoryStore::new());
    let cache = new_cache(store);

    let err = cache.add_tag_member("users", "bad,key").await.unwrap_err();
    assert!(matches!(err, CacheError::InvalidKey { .. }));
}
