//! Read path resolution across the near and DHT tiers
//!
//! Decides, for a get issued inside or outside a transaction, which
//! tier and which version to serve: the transaction's own staged
//! write always wins, then the near cache when its version stamp still
//! matches the authoritative store, then the authoritative path (which
//! refreshes the near cache on the way out).

use crate::cache::{Cache, TxHandle};
use crate::error::{CacheError, Result};
use meshcache_common::{ConcurrencyMode, IsolationLevel, TransactionId, Value};
use meshcache_store::Entry;

impl Cache {
    /// Read a value, inside an optional transaction context
    pub fn get(&self, key: &str, tx: Option<&TxHandle>) -> Result<Option<Value>> {
        match tx {
            Some(handle) => self.transactional_get(key, handle.xid()),
            None => self.plain_get(key),
        }
    }

    /// Non-locking snapshot of the authoritative entry, bypassing the
    /// near tier (diagnostics)
    pub fn peek(&self, key: &str) -> Option<Entry> {
        self.inner.store.peek(key)
    }

    /// Non-transactional read: near tier fast path, authoritative
    /// fallback with near refresh
    fn plain_get(&self, key: &str) -> Result<Option<Value>> {
        let store = &self.inner.store;

        if !self.inner.topology.owns_partition(key) {
            // Only the near tier can serve keys this node does not own
            return match self.inner.near.get(key) {
                Some(cached) => Ok(cached.value),
                None => Err(CacheError::KeyNotOwned(key.to_string())),
            };
        }

        if let Some(cached) = self.inner.near.get(key) {
            if cached.version == store.current_version(key) {
                return Ok(cached.value);
            }
        }

        match store.get(key) {
            Some(entry) => {
                self.inner.near.put(key, entry.value.clone(), entry.version);
                Ok(entry.value)
            }
            None => Ok(None),
        }
    }

    fn transactional_get(&self, key: &str, xid: TransactionId) -> Result<Option<Value>> {
        let txm = self.transaction(xid)?;
        let mut tx = txm.lock();
        tx.require_active()?;

        // A transaction always sees its own writes
        if let Some(staged) = tx.staged(key) {
            return Ok(staged.clone());
        }

        match tx.mode() {
            ConcurrencyMode::Pessimistic => {
                // Exclusive-lock at read time; repeated reads are
                // stable because no other transaction can commit the
                // key while the lock is held
                if !self.inner.topology.owns_partition(key) {
                    return Err(CacheError::KeyNotOwned(key.to_string()));
                }

                self.inner
                    .store
                    .locks()
                    .acquire(key, xid, self.inner.config.lock_timeout)?;

                let entry = self.inner.store.get(key).unwrap_or_else(Entry::vacant);
                self.inner.near.put(key, entry.value.clone(), entry.version);
                Ok(entry.value)
            }
            ConcurrencyMode::Optimistic => {
                // Stable isolation levels serve the first-read snapshot
                if tx.isolation().requires_read_stability() {
                    if let Some(snapshot) = tx.snapshot(key) {
                        return Ok(snapshot.clone());
                    }
                }

                if !self.inner.topology.owns_partition(key) {
                    // Un-owned keys can only be served from the near
                    // tier; record the cached version for commit-time
                    // validation
                    return match self.inner.near.get(key) {
                        Some(cached) => {
                            tx.record_read(key, cached.version);
                            if tx.isolation().requires_read_stability() {
                                tx.store_snapshot(key, cached.value.clone());
                            }
                            Ok(cached.value)
                        }
                        None => Err(CacheError::KeyNotOwned(key.to_string())),
                    };
                }

                // Read-committed reads may take the near fast path
                if tx.isolation() == IsolationLevel::ReadCommitted {
                    if let Some(cached) = self.inner.near.get(key) {
                        if cached.version == self.inner.store.current_version(key) {
                            tx.record_read(key, cached.version);
                            return Ok(cached.value);
                        }
                    }
                }

                let entry = self.inner.store.get(key).unwrap_or_else(Entry::vacant);
                tx.record_read(key, entry.version);
                if tx.isolation().requires_read_stability() {
                    tx.store_snapshot(key, entry.value.clone());
                }
                self.inner.near.put(key, entry.value.clone(), entry.version);
                Ok(entry.value)
            }
        }
    }
}
