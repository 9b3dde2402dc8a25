//! Integration tests for the transactional cache core

use meshcache_coordinator::{
    Cache, CacheConfig, CacheError, CommitRecord, ConcurrencyMode, IsolationLevel, PartitionMap,
    ReplicationSink, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn cache() -> Cache {
    Cache::new(CacheConfig::default())
}

fn cache_with_timeout(timeout: Duration) -> Cache {
    Cache::new(CacheConfig::default().with_lock_timeout(timeout))
}

// ============================================================================
// Basic read/write
// ============================================================================

#[test]
fn test_read_your_writes() {
    let cache = cache();

    cache.put("key1", Value::from("val"), None).unwrap();
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("val")));

    cache.put("key1", Value::from("val2"), None).unwrap();
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("val2")));
}

#[test]
fn test_get_missing_key() {
    let cache = cache();
    assert_eq!(cache.get("missing", None).unwrap(), None);
    assert!(cache.peek("missing").is_none());
}

#[test]
fn test_remove_is_logical_delete() {
    let cache = cache();

    cache.put("key1", Value::from("val"), None).unwrap();
    cache.remove("key1", None).unwrap();

    assert_eq!(cache.get("key1", None).unwrap(), None);

    // The entry keeps its version history
    let entry = cache.peek("key1").unwrap();
    assert_eq!(entry.value, None);
    assert_eq!(entry.version, 2);
}

#[test]
fn test_transaction_sees_own_writes() {
    let cache = cache();
    cache.put("key1", Value::from("old"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    cache.put("key1", Value::from("new"), Some(&tx)).unwrap();

    // Staged write visible to the transaction, not to others
    assert_eq!(
        cache.get("key1", Some(&tx)).unwrap(),
        Some(Value::from("new"))
    );
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("old")));

    cache.tx_commit(tx).unwrap();
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("new")));
}

// ============================================================================
// Isolation levels
// ============================================================================

#[test]
fn test_repeatable_read_stability() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::RepeatableRead);
    assert_eq!(
        cache.get("key1", Some(&tx)).unwrap(),
        Some(Value::from("a"))
    );

    // Another writer commits in between
    cache.put("key1", Value::from("b"), None).unwrap();

    // The transaction still sees its first read
    assert_eq!(
        cache.get("key1", Some(&tx)).unwrap(),
        Some(Value::from("a"))
    );
    cache.tx_rollback(tx).unwrap();

    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("b")));
}

#[test]
fn test_read_committed_sees_latest() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    assert_eq!(
        cache.get("key1", Some(&tx)).unwrap(),
        Some(Value::from("a"))
    );

    cache.put("key1", Value::from("b"), None).unwrap();

    assert_eq!(
        cache.get("key1", Some(&tx)).unwrap(),
        Some(Value::from("b"))
    );
    cache.tx_rollback(tx).unwrap();
}

#[test]
fn test_serializable_validates_reads_at_commit() {
    let cache = cache();
    cache.put("read_key", Value::from("a"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::Serializable);
    assert_eq!(
        cache.get("read_key", Some(&tx)).unwrap(),
        Some(Value::from("a"))
    );
    cache.put("write_key", Value::from(1), Some(&tx)).unwrap();

    // Externally modify a key the transaction only read
    cache.put("read_key", Value::from("b"), None).unwrap();

    let err = cache.tx_commit(tx).unwrap_err();
    assert!(matches!(err, CacheError::Conflict { .. }));

    // All-or-nothing: the staged write was not applied
    assert_eq!(cache.get("write_key", None).unwrap(), None);
}

#[test]
fn test_repeatable_read_does_not_validate_untouched_reads() {
    let cache = cache();
    cache.put("read_key", Value::from("a"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::RepeatableRead);
    assert_eq!(
        cache.get("read_key", Some(&tx)).unwrap(),
        Some(Value::from("a"))
    );
    cache.put("write_key", Value::from(1), Some(&tx)).unwrap();

    cache.put("read_key", Value::from("b"), None).unwrap();

    // Below serializable, a read-only key changing externally does not
    // fail the commit
    cache.tx_commit(tx).unwrap();
    assert_eq!(cache.get("write_key", None).unwrap(), Some(Value::from(1)));
}

// ============================================================================
// Optimistic conflict detection (Scenario B)
// ============================================================================

#[test]
fn test_optimistic_write_conflict() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();
    let version_at_read = cache.peek("key1").unwrap().version;

    // T1 reads the key optimistically
    let tx1 = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    assert_eq!(
        cache.get("key1", Some(&tx1)).unwrap(),
        Some(Value::from("a"))
    );

    // T2 writes the key and commits
    let tx2 = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    cache.put("key1", Value::from("b"), Some(&tx2)).unwrap();
    cache.tx_commit(tx2).unwrap();

    // T1 attempts to commit a write to the same key
    cache.put("key1", Value::from("c"), Some(&tx1)).unwrap();
    let err = cache.tx_commit(tx1).unwrap_err();
    assert_eq!(
        err,
        CacheError::Conflict {
            key: "key1".to_string(),
            expected: version_at_read,
            actual: version_at_read + 1,
        }
    );

    // The conflicting write was never applied
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("b")));
}

#[test]
fn test_optimistic_blind_writes_do_not_conflict() {
    let cache = cache();

    // Sequential blind writers validate against the version under lock
    for i in 0..3i64 {
        let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
        cache.put("key1", Value::from(i), Some(&tx)).unwrap();
        cache.tx_commit(tx).unwrap();
    }

    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from(2i64)));
    assert_eq!(cache.peek("key1").unwrap().version, 3);
}

// ============================================================================
// Pessimistic locking (Scenarios A, C)
// ============================================================================

#[test]
fn test_concurrent_pessimistic_getters() {
    const THREAD_NUM: usize = 20;

    let cache = cache();
    cache.put("X", Value::from("val"), None).unwrap();

    let mut handles = Vec::new();
    for _ in 0..THREAD_NUM {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);

            // The authoritative entry is visible alongside the
            // transactional read
            assert!(cache.peek("X").is_some());

            let val = cache.get("X", Some(&tx)).unwrap();
            assert_eq!(val, Some(Value::from("val")));

            cache.tx_commit(tx).unwrap();
            val
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), Some(Value::from("val")));
    }
}

#[test]
fn test_pessimistic_read_lock_times_out() {
    let cache = cache_with_timeout(Duration::from_millis(100));
    cache.put("key1", Value::from("val"), None).unwrap();

    // T1 locks the key and does not commit
    let tx1 = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
    cache.get("key1", Some(&tx1)).unwrap();

    // T2's read-lock attempt exceeds the configured bound
    let blocked = {
        let cache = cache.clone();
        std::thread::spawn(move || {
            let tx2 = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
            cache.get("key1", Some(&tx2))
        })
    };
    let err = blocked.join().unwrap().unwrap_err();
    assert_eq!(
        err,
        CacheError::LockTimeout {
            key: "key1".to_string()
        }
    );

    // Once T1 finishes, the key is lockable again
    cache.tx_rollback(tx1).unwrap();
    let tx3 = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
    assert_eq!(
        cache.get("key1", Some(&tx3)).unwrap(),
        Some(Value::from("val"))
    );
    cache.tx_commit(tx3).unwrap();
}

#[test]
fn test_pessimistic_writers_are_mutually_exclusive() {
    const WRITERS: i64 = 8;

    let cache = cache();
    cache.put("key1", Value::from(-1i64), None).unwrap();
    let initial_version = cache.peek("key1").unwrap().version;

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
            cache.put("key1", Value::from(i), Some(&tx)).unwrap();
            cache.tx_commit(tx).unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every commit applied exactly once, serially; no partial or lost
    // write is observable
    let entry = cache.peek("key1").unwrap();
    assert_eq!(entry.version, initial_version + WRITERS as u64);
    let written = entry.value.unwrap().as_i64().unwrap();
    assert!((0..WRITERS).contains(&written));
}

// ============================================================================
// Rollback (Scenario D)
// ============================================================================

#[test]
fn test_rollback_releases_locks_and_discards_writes() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();
    cache.put("key2", Value::from("b"), None).unwrap();

    let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
    let xid = tx.xid();

    // Acquire two locks, stage one write
    cache.get("key1", Some(&tx)).unwrap();
    cache.put("key2", Value::from("changed"), Some(&tx)).unwrap();
    assert!(cache.dht().locks().has_locks(xid));

    cache.tx_rollback(tx).unwrap();

    // Both locks released, store unchanged
    assert!(!cache.dht().locks().has_locks(xid));
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("a")));
    assert_eq!(cache.get("key2", None).unwrap(), Some(Value::from("b")));
}

#[test]
fn test_rollback_without_any_locks() {
    let cache = cache();
    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    cache.tx_rollback(tx).unwrap();
}

#[test]
fn test_dropped_handle_rolls_back() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();

    let xid = {
        let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
        cache.put("key1", Value::from("b"), Some(&tx)).unwrap();
        tx.xid()
        // Handle dropped here without commit
    };

    assert!(!cache.dht().locks().has_locks(xid));
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("a")));
}

// ============================================================================
// Near cache coherence
// ============================================================================

#[test]
fn test_near_cache_serves_and_invalidates() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();

    // First read populates the near tier
    cache.get("key1", None).unwrap();
    let cached = cache.near().get("key1").unwrap();
    assert_eq!(cached.value, Some(Value::from("a")));
    assert_eq!(cached.version, 1);

    // A committed mutation synchronously invalidates the near entry
    cache.put("key1", Value::from("b"), None).unwrap();
    assert!(cache.near().get("key1").is_none());

    // The next resolved read never returns the stale version
    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("b")));
    assert_eq!(cache.near().get("key1").unwrap().version, 2);
}

#[test]
fn test_transactional_commit_invalidates_near() {
    let cache = cache();
    cache.put("key1", Value::from("a"), None).unwrap();
    cache.get("key1", None).unwrap();
    assert!(cache.near().get("key1").is_some());

    let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
    cache.put("key1", Value::from("b"), Some(&tx)).unwrap();
    cache.tx_commit(tx).unwrap();

    assert_eq!(cache.get("key1", None).unwrap(), Some(Value::from("b")));
}

// ============================================================================
// Partition ownership
// ============================================================================

struct OwnsNothing;

impl PartitionMap for OwnsNothing {
    fn owns_partition(&self, _key: &str) -> bool {
        false
    }
}

#[test]
fn test_unowned_key_rejected() {
    let cache = Cache::with_collaborators(
        CacheConfig::default(),
        Arc::new(OwnsNothing),
        Arc::new(meshcache_coordinator::NoopSink),
    );

    let err = cache.put("key1", Value::from(1), None).unwrap_err();
    assert_eq!(err, CacheError::KeyNotOwned("key1".to_string()));

    let err = cache.get("key1", None).unwrap_err();
    assert_eq!(err, CacheError::KeyNotOwned("key1".to_string()));
}

#[test]
fn test_unowned_key_served_from_near_tier() {
    let cache = Cache::with_collaborators(
        CacheConfig::default(),
        Arc::new(OwnsNothing),
        Arc::new(meshcache_coordinator::NoopSink),
    );

    // A fronted entry placed by the (external) refresh path
    cache.near().put("key1", Some(Value::from("remote")), 4);

    assert_eq!(
        cache.get("key1", None).unwrap(),
        Some(Value::from("remote"))
    );

    // Writes still require ownership
    let err = cache.put("key1", Value::from(1), None).unwrap_err();
    assert_eq!(err, CacheError::KeyNotOwned("key1".to_string()));
}

// ============================================================================
// Replication collaborator
// ============================================================================

#[derive(Default)]
struct RecordingSink(Mutex<Vec<CommitRecord>>);

impl ReplicationSink for RecordingSink {
    fn replicate(&self, record: CommitRecord) {
        self.0.lock().push(record);
    }
}

#[test]
fn test_commit_records_emitted_per_mutated_entry() {
    let sink = Arc::new(RecordingSink::default());
    let cache = Cache::with_collaborators(
        CacheConfig::default(),
        Arc::new(meshcache_coordinator::SingleNode),
        sink.clone(),
    );

    let tx = cache.tx_start(ConcurrencyMode::Pessimistic, IsolationLevel::RepeatableRead);
    let xid = tx.xid();
    cache.put("a", Value::from(1), Some(&tx)).unwrap();
    cache.put("b", Value::from(2), Some(&tx)).unwrap();
    cache.tx_commit(tx).unwrap();

    let records = sink.0.lock();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.xid == xid));
    assert_eq!(records[0].key, "a");
    assert_eq!(records[0].new_value, Some(Value::from(1)));
    assert_eq!(records[0].new_version, 1);
    assert_eq!(records[1].key, "b");
}

#[test]
fn test_no_records_on_conflict() {
    let sink = Arc::new(RecordingSink::default());
    let cache = Cache::with_collaborators(
        CacheConfig::default(),
        Arc::new(meshcache_coordinator::SingleNode),
        sink.clone(),
    );

    cache.put("key1", Value::from("a"), None).unwrap();
    sink.0.lock().clear();

    let tx = cache.tx_start(ConcurrencyMode::Optimistic, IsolationLevel::ReadCommitted);
    cache.get("key1", Some(&tx)).unwrap();
    cache.put("key1", Value::from("b"), None).unwrap();
    sink.0.lock().clear();

    cache.put("key1", Value::from("c"), Some(&tx)).unwrap();
    assert!(cache.tx_commit(tx).is_err());

    assert!(sink.0.lock().is_empty());
}
