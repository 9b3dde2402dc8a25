//! Shared types for the meshcache transactional core
//!
//! Leaf types used by both the storage tier and the transaction
//! coordinator: transaction identifiers, the typed value model, and the
//! concurrency mode / isolation level variants.

mod modes;
mod transaction_id;
mod value;

pub use modes::{ConcurrencyMode, IsolationLevel};
pub use transaction_id::TransactionId;
pub use value::Value;
