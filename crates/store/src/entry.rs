//! Versioned cache entry

use meshcache_common::Value;

/// A committed snapshot of an entry in the authoritative store
///
/// An absent value is a valid state meaning logically deleted or never
/// set; version 0 with no value means the key has never been written.
/// The version strictly increases on every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Current committed value, absent for deleted or never-set keys
    pub value: Option<Value>,

    /// Monotonically increasing version number
    pub version: u64,
}

impl Entry {
    /// An entry that has never been written
    pub fn vacant() -> Self {
        Self {
            value: None,
            version: 0,
        }
    }

    /// Whether this entry has ever been written
    pub fn is_vacant(&self) -> bool {
        self.version == 0
    }
}
