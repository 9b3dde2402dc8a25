//! Lock manager for the entry store
//!
//! Provides key-level exclusive locking with transaction ownership,
//! FIFO granting among blocked waiters, and a bounded wait that doubles
//! as the deadlock-breaking mechanism.

use crate::error::{Error, Result};
use meshcache_common::TransactionId;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A held exclusive lock
#[derive(Debug, Clone, Copy)]
struct Holder {
    xid: TransactionId,
    acquired_at: Instant,
}

/// Per-key lock state: at most one exclusive holder plus a FIFO queue
/// of blocked transactions
#[derive(Debug, Default)]
struct LockRecord {
    holder: Option<Holder>,
    waiters: VecDeque<TransactionId>,
}

/// Lock manager for key-level exclusive locking
///
/// Owned by the entry store partition instance; each partition's lock
/// table is independently constructible and testable. Lock release
/// happens only on transaction commit or rollback, never implicitly.
pub struct LockManager {
    table: Mutex<HashMap<String, LockRecord>>,
    released: Condvar,
}

impl LockManager {
    /// Create a new lock manager
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
        }
    }

    /// Acquire the exclusive lock on a key, blocking up to `timeout`
    ///
    /// Re-entrant acquire by the current holder is a no-op. Grants are
    /// FIFO among waiters: a blocked transaction is granted the lock
    /// only once it reaches the front of the key's wait queue.
    pub fn acquire(&self, key: &str, xid: TransactionId, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut table = self.table.lock();
        let mut enqueued = false;

        loop {
            let record = table.entry(key.to_string()).or_default();

            // Re-entrant acquire is a no-op
            if record.holder.map(|h| h.xid) == Some(xid) {
                return Ok(());
            }

            let at_front = match record.waiters.front() {
                None => !enqueued,
                Some(front) => *front == xid,
            };

            if record.holder.is_none() && at_front {
                if record.waiters.front() == Some(&xid) {
                    record.waiters.pop_front();
                }
                record.holder = Some(Holder {
                    xid,
                    acquired_at: Instant::now(),
                });
                return Ok(());
            }

            if !enqueued {
                record.waiters.push_back(xid);
                enqueued = true;
            }

            if self.released.wait_until(&mut table, deadline).timed_out() {
                // Leave the queue; the next waiter may now be at the front
                if let Some(record) = table.get_mut(key) {
                    record.waiters.retain(|w| *w != xid);
                    if record.holder.is_none() && record.waiters.is_empty() {
                        table.remove(key);
                    }
                }
                drop(table);
                self.released.notify_all();

                tracing::warn!(key, %xid, "lock wait timed out");
                return Err(Error::LockTimeout {
                    key: key.to_string(),
                });
            }
        }
    }

    /// Release the lock on a key if held by the given transaction
    pub fn release(&self, key: &str, xid: TransactionId) {
        let mut table = self.table.lock();
        if let Some(record) = table.get_mut(key) {
            if record.holder.map(|h| h.xid) == Some(xid) {
                record.holder = None;
                if record.waiters.is_empty() {
                    table.remove(key);
                }
            }
        }
        drop(table);
        self.released.notify_all();
    }

    /// Release every lock held by a transaction
    pub fn release_all(&self, xid: TransactionId) {
        let mut table = self.table.lock();
        table.retain(|_key, record| {
            if record.holder.map(|h| h.xid) == Some(xid) {
                record.holder = None;
            }
            record.waiters.retain(|w| *w != xid);
            record.holder.is_some() || !record.waiters.is_empty()
        });
        drop(table);
        self.released.notify_all();
    }

    /// Current holder of a key's lock, if any
    pub fn holder(&self, key: &str) -> Option<TransactionId> {
        self.table.lock().get(key).and_then(|r| r.holder.map(|h| h.xid))
    }

    /// How long the current holder has held a key's lock
    pub fn held_for(&self, key: &str) -> Option<Duration> {
        self.table
            .lock()
            .get(key)
            .and_then(|r| r.holder.map(|h| h.acquired_at.elapsed()))
    }

    /// All keys locked by a transaction, sorted for determinism
    pub fn locks_held_by(&self, xid: TransactionId) -> Vec<String> {
        let table = self.table.lock();
        let mut keys: Vec<String> = table
            .iter()
            .filter(|(_, r)| r.holder.map(|h| h.xid) == Some(xid))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Whether a transaction holds any locks
    pub fn has_locks(&self, xid: TransactionId) -> bool {
        self.table
            .lock()
            .values()
            .any(|r| r.holder.map(|h| h.xid) == Some(xid))
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
