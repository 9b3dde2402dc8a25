//! Storage tier for the meshcache transactional core
//!
//! Provides the authoritative versioned entry store for a partition
//! (the DHT role), key-level exclusive locking with FIFO blocking
//! acquisition, and the non-authoritative near cache that fronts it.

pub mod config;
pub mod entry;
pub mod error;
pub mod lock;
pub mod near;
pub mod partition;

pub use config::CacheConfig;
pub use entry::Entry;
pub use error::{Error, Result};
pub use lock::LockManager;
pub use near::{CachedEntry, NearCache};
pub use partition::{EntryStore, InvalidationListener};
