//! Replication collaborator interface
//!
//! After a local commit the coordinator emits one commit record per
//! mutated entry for an external replication/persistence layer. The
//! local commit is final before the sink runs; replication is
//! fire-and-forget from this core's perspective.

use meshcache_common::{TransactionId, Value};
use serde::{Deserialize, Serialize};

/// A committed mutation to a single entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Transaction that committed the mutation
    pub xid: TransactionId,

    /// Mutated key
    pub key: String,

    /// Committed value, absent for logical deletes
    pub new_value: Option<Value>,

    /// Version assigned by the entry store
    pub new_version: u64,
}

/// Consumer of commit records
///
/// Implementations must not block the commit path.
pub trait ReplicationSink: Send + Sync {
    /// Consume one committed mutation
    fn replicate(&self, record: CommitRecord);
}

/// Sink that discards every record
pub struct NoopSink;

impl ReplicationSink for NoopSink {
    fn replicate(&self, _record: CommitRecord) {}
}
