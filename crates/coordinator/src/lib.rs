//! Transaction coordination for the meshcache core
//!
//! Drives ACID-style transactions over the storage tier: tracks each
//! transaction's read and write sets, enforces the configured
//! concurrency mode and isolation level, resolves reads across the
//! near/DHT tiers, and applies commits atomically through the entry
//! store.

pub mod cache;
pub mod error;
pub mod replication;
pub mod resolver;
pub mod topology;
pub mod transaction;

pub use cache::{Cache, TxHandle};
pub use error::{CacheError, Result};
pub use replication::{CommitRecord, NoopSink, ReplicationSink};
pub use topology::{PartitionMap, SingleNode};
pub use transaction::{Transaction, TxState};

// Re-export the shared types for convenience
pub use meshcache_common::{ConcurrencyMode, IsolationLevel, TransactionId, Value};
pub use meshcache_store::{CacheConfig, Entry};
