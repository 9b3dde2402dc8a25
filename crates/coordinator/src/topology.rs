//! Partition ownership collaborator
//!
//! Partition assignment itself is external to this core; the
//! coordinator only consumes the ownership answer per key.

/// Answers whether this node owns the authoritative partition for a key
/// or only fronts a near-cache view of it
pub trait PartitionMap: Send + Sync {
    /// Whether this node hosts the authoritative copy of `key`
    fn owns_partition(&self, key: &str) -> bool;
}

/// Single-node topology: this node owns every partition
///
/// The default for tests and single-node deployments.
pub struct SingleNode;

impl PartitionMap for SingleNode {
    fn owns_partition(&self, _key: &str) -> bool {
        true
    }
}
