//! Per-key in-flight serialization for miss coalescing
//!
//! When coalescing is enabled, the cache layer takes a per-key lock around
//! the read-through sequence: the first miss performs the upstream fetch
//! while followers wait on the same lock and then find the entry cached.
//! The contract is "at most one upstream fetch in flight per key".

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-key locks.
///
/// Slots are created lazily and garbage-collected on the next acquisition
/// once no flight holds them.
pub(crate) struct KeyLocks {
    registry: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one read-through sequence.
pub(crate) struct Flight {
    _guard: OwnedMutexGuard<()>,
}

impl KeyLocks {
    pub(crate) fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive in-flight access to `key`.
    pub(crate) async fn acquire(&self, key: &str) -> Flight {
        let slot = {
            let mut registry = self.registry.lock().await;
            // Drop slots no flight references anymore; the map's Arc is the
            // only remaining owner for those
            registry.retain(|_, slot| Arc::strong_count(slot) > 1);
            registry
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        Flight {
            _guard: slot.lock_owned().await,
        }
    }
}
