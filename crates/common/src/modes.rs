//! Concurrency control mode and isolation level variants
//!
//! Both are closed variants consumed by the transaction coordinator's
//! state machine; every transition pattern-matches on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a transaction coordinates with concurrent writers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcurrencyMode {
    /// Read without locks, validate observed versions at commit
    Optimistic,
    /// Acquire exclusive locks before access, hold until commit/rollback
    Pessimistic,
}

/// Strength of the guarantee about observing other transactions' changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Reads observe the latest committed value, no read stability
    ReadCommitted,
    /// Repeated reads of a key within one transaction return the same value
    RepeatableRead,
    /// Repeatable read plus commit-time validation of every read version
    Serializable,
}

impl IsolationLevel {
    /// Whether reads must stay stable for the life of the transaction
    pub fn requires_read_stability(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }

    /// Whether read versions are re-validated at commit time
    pub fn requires_read_validation(&self) -> bool {
        matches!(self, IsolationLevel::Serializable)
    }
}

impl fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyMode::Optimistic => write!(f, "optimistic"),
            ConcurrencyMode::Pessimistic => write!(f, "pessimistic"),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read_committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable_read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}
