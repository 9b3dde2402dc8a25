//! Cache configuration

use std::time::Duration;

/// Configuration for a cache partition and its near tier
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on a pessimistic lock wait
    ///
    /// Also the deadlock-breaking mechanism: no waits-for graph is
    /// maintained, a cross-entry deadlock resolves when one side's
    /// wait exceeds this bound.
    pub lock_timeout: Duration,

    /// Maximum number of entries held by the near cache
    pub near_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            near_capacity: 1024,
        }
    }
}

impl CacheConfig {
    /// Set the pessimistic lock wait bound
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the near cache capacity
    pub fn with_near_capacity(mut self, capacity: usize) -> Self {
        self.near_capacity = capacity;
        self
    }
}
