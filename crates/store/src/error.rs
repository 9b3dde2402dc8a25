//! Error types for the storage tier

use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the entry store and lock manager
///
/// Neither component retries internally; retry policy lives in the
/// transaction coordinator or above.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The expected version no longer matches the entry's current version
    #[error("version conflict on '{key}': expected {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// A pessimistic lock acquisition exceeded its wait bound
    #[error("timed out waiting for lock on '{key}'")]
    LockTimeout { key: String },
}
