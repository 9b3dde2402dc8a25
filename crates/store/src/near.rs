//! Near cache: the fast-path local tier
//!
//! Holds (value, version) pairs for keys whose authoritative copy lives
//! in an entry store, with no reference into the store itself. The
//! cache is best-effort: it never blocks a reader and never participates
//! in the locking path. Staleness is detected downstream by comparing
//! the cached version stamp against the store's current version.

use crate::partition::InvalidationListener;
use lru::LruCache;
use meshcache_common::Value;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A cached (value, version) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    /// Last seen committed value
    pub value: Option<Value>,

    /// Version observed when the value was cached
    pub version: u64,
}

/// Node-local, non-authoritative cache fronting an entry store
pub struct NearCache {
    entries: Mutex<LruCache<String, CachedEntry>>,
}

impl NearCache {
    /// Create a near cache bounded to `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached value and version for a key, if present
    pub fn get(&self, key: &str) -> Option<CachedEntry> {
        self.entries.lock().get(key).cloned()
    }

    /// Cache a value observed at the given version
    pub fn put(&self, key: &str, value: Option<Value>, version: u64) {
        self.entries
            .lock()
            .put(key.to_string(), CachedEntry { value, version });
    }

    /// Drop a key's cached entry
    pub fn invalidate(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl InvalidationListener for NearCache {
    fn invalidate(&self, key: &str) {
        tracing::debug!(key, "near cache invalidated");
        NearCache::invalidate(self, key);
    }
}
