//! Transaction state machine and access tracking
//!
//! A transaction records the versions it observed (read-set) and the
//! mutations it staged (write-set). The coordinator drives the state
//! machine; every transition pattern-matches on the concurrency mode
//! and isolation level variants.

use crate::error::{CacheError, Result};
use meshcache_common::{ConcurrencyMode, IsolationLevel, TransactionId, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Lifecycle state of a transaction
///
/// `Committed` and `RolledBack` are terminal; committing or rolling
/// back a terminal transaction is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Accepting reads and writes
    Active,
    /// Commit in progress: locks being acquired, reads validated
    Preparing,
    /// All writes applied, locks released
    Committed,
    /// Write-set discarded, locks released
    RolledBack,
}

impl TxState {
    /// Whether this state accepts no further operations
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack)
    }
}

/// A single transaction's state, read-set and write-set
pub struct Transaction {
    xid: TransactionId,
    mode: ConcurrencyMode,
    isolation: IsolationLevel,
    state: TxState,

    /// Version observed at first read, per key
    read_set: HashMap<String, u64>,

    /// First-read values served back on repeated reads under
    /// repeatable-read and serializable optimistic transactions
    snapshots: HashMap<String, Option<Value>>,

    /// Pending mutations; absent values stage logical deletes.
    /// BTreeMap keeps the keys in deterministic order for commit-time
    /// lock acquisition.
    write_set: BTreeMap<String, Option<Value>>,
}

impl Transaction {
    /// Create a new active transaction
    pub fn new(mode: ConcurrencyMode, isolation: IsolationLevel) -> Self {
        Self {
            xid: TransactionId::new(),
            mode,
            isolation,
            state: TxState::Active,
            read_set: HashMap::new(),
            snapshots: HashMap::new(),
            write_set: BTreeMap::new(),
        }
    }

    /// Transaction identifier
    pub fn xid(&self) -> TransactionId {
        self.xid
    }

    /// Concurrency control mode
    pub fn mode(&self) -> ConcurrencyMode {
        self.mode
    }

    /// Isolation level
    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Current lifecycle state
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Error unless the transaction still accepts operations
    pub fn require_active(&self) -> Result<()> {
        match self.state {
            TxState::Active => Ok(()),
            state => Err(CacheError::InvalidState(format!(
                "transaction {} is {:?}",
                self.xid, state
            ))),
        }
    }

    /// Transition Active -> Preparing
    pub fn begin_prepare(&mut self) -> Result<()> {
        self.require_active()?;
        self.state = TxState::Preparing;
        Ok(())
    }

    /// Transition Active | Preparing -> RolledBack
    pub fn mark_rolled_back(&mut self) -> Result<()> {
        match self.state {
            TxState::Active | TxState::Preparing => {
                self.state = TxState::RolledBack;
                self.write_set.clear();
                Ok(())
            }
            state => Err(CacheError::InvalidState(format!(
                "transaction {} is {:?}",
                self.xid, state
            ))),
        }
    }

    /// Transition Preparing -> Committed
    pub fn mark_committed(&mut self) -> Result<()> {
        match self.state {
            TxState::Preparing => {
                self.state = TxState::Committed;
                Ok(())
            }
            state => Err(CacheError::InvalidState(format!(
                "transaction {} is {:?}",
                self.xid, state
            ))),
        }
    }

    /// Staged value for a key, if this transaction wrote it
    pub fn staged(&self, key: &str) -> Option<&Option<Value>> {
        self.write_set.get(key)
    }

    /// Stage a mutation into the write-set
    pub fn stage_write(&mut self, key: &str, value: Option<Value>) {
        self.write_set.insert(key.to_string(), value);
    }

    /// Record the version observed at first read; later reads of the
    /// same key keep the original observation
    pub fn record_read(&mut self, key: &str, version: u64) {
        self.read_set.entry(key.to_string()).or_insert(version);
    }

    /// Version observed at first read, if the key was read
    pub fn observed_version(&self, key: &str) -> Option<u64> {
        self.read_set.get(key).copied()
    }

    /// Snapshot the first-read value for stable re-reads
    pub fn store_snapshot(&mut self, key: &str, value: Option<Value>) {
        self.snapshots.entry(key.to_string()).or_insert(value);
    }

    /// Snapshotted first-read value, if any
    pub fn snapshot(&self, key: &str) -> Option<&Option<Value>> {
        self.snapshots.get(key)
    }

    /// Keys to lock at commit time, in deterministic (sorted) order
    ///
    /// Always the write-set; serializable transactions additionally
    /// lock every read key so validation is race-free.
    pub fn commit_lock_keys(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self.write_set.keys().cloned().collect();
        if self.isolation.requires_read_validation() {
            keys.extend(self.read_set.keys().cloned());
        }
        keys
    }

    /// Read-set iterator: (key, version observed at first read)
    pub fn read_set(&self) -> impl Iterator<Item = (&String, u64)> {
        self.read_set.iter().map(|(k, v)| (k, *v))
    }

    /// Write-set iterator in key order
    pub fn write_set(&self) -> impl Iterator<Item = (&String, &Option<Value>)> {
        self.write_set.iter()
    }

    /// Whether any mutation is staged
    pub fn has_writes(&self) -> bool {
        !self.write_set.is_empty()
    }
}
