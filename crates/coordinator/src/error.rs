//! Error types for the transaction coordinator

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors surfaced to cache callers
///
/// Conflict and lock timeout are recoverable (the caller typically
/// retries the whole transaction); the other two are surfaced
/// immediately and not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Optimistic validation failed at commit
    #[error("version conflict on '{key}': expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A pessimistic lock acquisition exceeded its wait bound
    #[error("timed out waiting for lock on '{key}'")]
    LockTimeout { key: String },

    /// Operation attempted on a terminal or unknown transaction
    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    /// The key's partition is not owned by this node and no near cache
    /// path exists
    #[error("key '{0}' is not owned by this node")]
    KeyNotOwned(String),
}

impl From<meshcache_store::Error> for CacheError {
    fn from(e: meshcache_store::Error) -> Self {
        match e {
            meshcache_store::Error::Conflict {
                key,
                expected,
                actual,
            } => CacheError::Conflict {
                key,
                expected,
                actual,
            },
            meshcache_store::Error::LockTimeout { key } => CacheError::LockTimeout { key },
        }
    }
}
