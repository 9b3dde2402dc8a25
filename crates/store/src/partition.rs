//! Authoritative entry store for a partition
//!
//! The store owns the versioned entries and the lock table for the
//! keys this node hosts (the DHT role). All mutation goes through
//! `upsert` under the entry's exclusive lock; per-entry mutation is
//! serial by construction and there is no store-wide lock.

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::lock::LockManager;
use meshcache_common::{TransactionId, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Receiver for synchronous invalidation of stale cached entries
///
/// Notified on every successful upsert, regardless of which transaction
/// performed it. Implementations must not block.
pub trait InvalidationListener: Send + Sync {
    /// A key's authoritative entry has changed
    fn invalidate(&self, key: &str);
}

/// Authoritative versioned entry store for one partition
pub struct EntryStore {
    entries: RwLock<HashMap<String, Entry>>,
    locks: LockManager,
    listeners: RwLock<Vec<Arc<dyn InvalidationListener>>>,
}

impl EntryStore {
    /// Create a new, empty partition
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            locks: LockManager::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// The lock table for this partition's keys
    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Register a listener for entry invalidation
    pub fn register_listener(&self, listener: Arc<dyn InvalidationListener>) {
        self.listeners.write().push(listener);
    }

    /// Committed snapshot of an entry
    ///
    /// Returns `None` for keys that have never been written.
    pub fn get(&self, key: &str) -> Option<Entry> {
        self.entries.read().get(key).cloned()
    }

    /// Non-transactional, non-locking snapshot read
    ///
    /// Used for diagnostics and by the near cache to refresh.
    pub fn peek(&self, key: &str) -> Option<Entry> {
        self.get(key)
    }

    /// Current committed version of a key, 0 if never written
    pub fn current_version(&self, key: &str) -> u64 {
        self.entries.read().get(key).map_or(0, |e| e.version)
    }

    /// Apply a committed mutation to an entry
    ///
    /// The caller must hold the entry's exclusive lock as `xid`;
    /// mutating without it is a programming error and panics. Fails
    /// with a conflict when `expected_version` no longer matches the
    /// entry's current version; the caller decides whether that aborts
    /// the transaction. Every successful upsert bumps the version and
    /// synchronously notifies the registered invalidation listeners.
    pub fn upsert(
        &self,
        key: &str,
        value: Option<Value>,
        expected_version: u64,
        xid: TransactionId,
    ) -> Result<u64> {
        let holder = self.locks.holder(key);
        assert_eq!(
            holder,
            Some(xid),
            "upsert on '{}' requires the entry lock (holder: {:?})",
            key,
            holder,
        );

        let new_version = {
            let mut entries = self.entries.write();
            let entry = entries.entry(key.to_string()).or_insert_with(Entry::vacant);

            if entry.version != expected_version {
                return Err(Error::Conflict {
                    key: key.to_string(),
                    expected: expected_version,
                    actual: entry.version,
                });
            }

            entry.version += 1;
            entry.value = value;
            entry.version
        };

        // Notify outside the entries lock; listeners must not block
        for listener in self.listeners.read().iter() {
            listener.invalidate(key);
        }

        tracing::debug!(key, %xid, version = new_version, "entry upserted");
        Ok(new_version)
    }

    /// Number of keys ever written in this partition
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether this partition has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new()
    }
}
