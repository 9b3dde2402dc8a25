//! Client-facing cache surface and transaction lifecycle
//!
//! The cache fronts one entry store partition (the DHT role) with a
//! near tier, and coordinates transactions over both. Commit applies
//! the write-set atomically through the entry store; every mutated
//! entry is announced to the replication sink after the local commit
//! is final.

use crate::error::{CacheError, Result};
use crate::replication::{CommitRecord, NoopSink, ReplicationSink};
use crate::topology::{PartitionMap, SingleNode};
use crate::transaction::Transaction;
use meshcache_common::{ConcurrencyMode, IsolationLevel, TransactionId, Value};
use meshcache_store::{CacheConfig, EntryStore, NearCache};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) struct CacheInner {
    pub(crate) store: Arc<EntryStore>,
    pub(crate) near: Arc<NearCache>,
    pub(crate) topology: Arc<dyn PartitionMap>,
    replication: Arc<dyn ReplicationSink>,
    pub(crate) config: CacheConfig,

    /// Live transactions; terminal transactions are removed, so a
    /// lookup miss means unknown or already completed
    active: Mutex<HashMap<TransactionId, Arc<Mutex<Transaction>>>>,
}

/// The transactional core of one cache partition
///
/// Cheap to clone; clones share the same partition state.
#[derive(Clone)]
pub struct Cache {
    pub(crate) inner: Arc<CacheInner>,
}

impl Cache {
    /// Create a single-node cache with no replication
    pub fn new(config: CacheConfig) -> Self {
        Self::with_collaborators(config, Arc::new(SingleNode), Arc::new(NoopSink))
    }

    /// Create a cache wired to external partitioning and replication
    /// collaborators
    pub fn with_collaborators(
        config: CacheConfig,
        topology: Arc<dyn PartitionMap>,
        replication: Arc<dyn ReplicationSink>,
    ) -> Self {
        let store = Arc::new(EntryStore::new());
        let near = Arc::new(NearCache::new(config.near_capacity));
        store.register_listener(near.clone());

        Self {
            inner: Arc::new(CacheInner {
                store,
                near,
                topology,
                replication,
                config,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The authoritative store tier (diagnostics)
    pub fn dht(&self) -> &EntryStore {
        &self.inner.store
    }

    /// The near cache tier (diagnostics)
    pub fn near(&self) -> &NearCache {
        &self.inner.near
    }

    /// Start a transaction
    pub fn tx_start(&self, mode: ConcurrencyMode, isolation: IsolationLevel) -> TxHandle {
        let tx = Transaction::new(mode, isolation);
        let xid = tx.xid();
        self.inner
            .active
            .lock()
            .insert(xid, Arc::new(Mutex::new(tx)));

        tracing::debug!(%xid, %mode, %isolation, "transaction started");
        TxHandle {
            cache: self.clone(),
            xid,
            finished: false,
        }
    }

    /// Write a value, inside a transaction or as an implicit
    /// single-operation pessimistic transaction
    pub fn put(&self, key: &str, value: Value, tx: Option<&TxHandle>) -> Result<()> {
        self.write(key, Some(value), tx)
    }

    /// Logically delete a key (the entry keeps its version history)
    pub fn remove(&self, key: &str, tx: Option<&TxHandle>) -> Result<()> {
        self.write(key, None, tx)
    }

    /// Commit a transaction; conflict or lock timeout rolls it back
    pub fn tx_commit(&self, mut tx: TxHandle) -> Result<()> {
        tx.finished = true;
        self.commit_xid(tx.xid)
    }

    /// Roll a transaction back, discarding its write-set
    pub fn tx_rollback(&self, mut tx: TxHandle) -> Result<()> {
        tx.finished = true;
        self.rollback_xid(tx.xid)
    }

    pub(crate) fn transaction(&self, xid: TransactionId) -> Result<Arc<Mutex<Transaction>>> {
        self.inner.active.lock().get(&xid).cloned().ok_or_else(|| {
            CacheError::InvalidState(format!("transaction {} is unknown or completed", xid))
        })
    }

    fn write(&self, key: &str, value: Option<Value>, tx: Option<&TxHandle>) -> Result<()> {
        if !self.inner.topology.owns_partition(key) {
            return Err(CacheError::KeyNotOwned(key.to_string()));
        }

        let handle = match tx {
            Some(handle) => handle,
            None => return self.autocommit_write(key, value),
        };

        let txm = self.transaction(handle.xid)?;
        let mut tx = txm.lock();
        tx.require_active()?;

        // Pessimistic writers take the exclusive lock up front;
        // optimistic writers defer locking to commit
        if tx.mode() == ConcurrencyMode::Pessimistic {
            self.inner
                .store
                .locks()
                .acquire(key, tx.xid(), self.inner.config.lock_timeout)?;
        }

        tx.stage_write(key, value);
        Ok(())
    }

    /// A non-transactional write runs as its own pessimistic
    /// single-entry transaction
    fn autocommit_write(&self, key: &str, value: Option<Value>) -> Result<()> {
        let xid = TransactionId::new();
        let store = &self.inner.store;

        store.locks().acquire(key, xid, self.inner.config.lock_timeout)?;
        let result = (|| -> Result<CommitRecord> {
            let expected = store.current_version(key);
            let new_version = store.upsert(key, value.clone(), expected, xid)?;
            Ok(CommitRecord {
                xid,
                key: key.to_string(),
                new_value: value,
                new_version,
            })
        })();
        store.locks().release(key, xid);

        let record = result?;
        self.inner.replication.replicate(record);
        Ok(())
    }

    fn commit_xid(&self, xid: TransactionId) -> Result<()> {
        let txm = self.transaction(xid)?;
        let mut tx = txm.lock();
        tx.begin_prepare()?;

        let outcome = self.prepare_and_apply(&tx);
        match outcome {
            Ok(records) => {
                tx.mark_committed()?;
                self.finish(xid);
                // Local commit is final; replication is fire-and-forget
                for record in records {
                    self.inner.replication.replicate(record);
                }
                tracing::debug!(%xid, "transaction committed");
                Ok(())
            }
            Err(e) => {
                tx.mark_rolled_back()?;
                self.finish(xid);
                tracing::warn!(%xid, error = %e, "transaction rolled back at commit");
                Err(e)
            }
        }
    }

    /// Prepare and apply under the transaction's own lock
    ///
    /// All-or-nothing: every write is validated against the entry
    /// store before any write is applied, so a conflict can never
    /// leave a partial commit behind.
    fn prepare_and_apply(&self, tx: &Transaction) -> Result<Vec<CommitRecord>> {
        let store = &self.inner.store;
        let locks = store.locks();
        let xid = tx.xid();

        // Pessimistic transactions held their locks continuously and
        // need no re-verification
        if tx.mode() == ConcurrencyMode::Optimistic {
            for key in tx.commit_lock_keys() {
                locks.acquire(&key, xid, self.inner.config.lock_timeout)?;
            }

            if tx.isolation().requires_read_validation() {
                for (key, observed) in tx.read_set() {
                    let current = store.current_version(key);
                    if current != observed {
                        return Err(CacheError::Conflict {
                            key: key.clone(),
                            expected: observed,
                            actual: current,
                        });
                    }
                }
            }
        }

        let mut planned = Vec::new();
        for (key, value) in tx.write_set() {
            let expected = tx
                .observed_version(key)
                .unwrap_or_else(|| store.current_version(key));
            let current = store.current_version(key);
            if current != expected {
                return Err(CacheError::Conflict {
                    key: key.clone(),
                    expected,
                    actual: current,
                });
            }
            planned.push((key.clone(), value.clone(), expected));
        }

        let mut records = Vec::with_capacity(planned.len());
        for (key, value, expected) in planned {
            let new_version = store.upsert(&key, value.clone(), expected, xid)?;
            records.push(CommitRecord {
                xid,
                key,
                new_value: value,
                new_version,
            });
        }

        Ok(records)
    }

    pub(crate) fn rollback_xid(&self, xid: TransactionId) -> Result<()> {
        let txm = self.transaction(xid)?;
        let mut tx = txm.lock();
        tx.mark_rolled_back()?;
        self.finish(xid);

        tracing::debug!(%xid, "transaction rolled back");
        Ok(())
    }

    /// Release the transaction's locks and forget it
    fn finish(&self, xid: TransactionId) {
        self.inner.store.locks().release_all(xid);
        self.inner.active.lock().remove(&xid);
    }
}

/// Handle to a live transaction
///
/// Dropping an unfinished handle rolls the transaction back, so
/// transaction resources are released on every exit path, including
/// error paths. Commit and rollback consume the handle; a terminal
/// transaction cannot be driven twice.
pub struct TxHandle {
    cache: Cache,
    xid: TransactionId,
    finished: bool,
}

impl TxHandle {
    /// Transaction identifier (for diagnostics and log correlation)
    pub fn xid(&self) -> TransactionId {
        self.xid
    }

    /// Commit this transaction
    pub fn commit(self) -> Result<()> {
        let cache = self.cache.clone();
        cache.tx_commit(self)
    }

    /// Roll this transaction back
    pub fn rollback(self) -> Result<()> {
        let cache = self.cache.clone();
        cache.tx_rollback(self)
    }
}

impl Drop for TxHandle {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(xid = %self.xid, "unfinished transaction handle dropped");
            let _ = self.cache.rollback_xid(self.xid);
        }
    }
}
