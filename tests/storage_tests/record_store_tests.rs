//! Tests for FileRecordStore
//!
//! These tests verify:
//! - put/get/set/del semantics and id assignment
//! - Persistence across reopen
//! - Torn-tail and checksum recovery
//! - Compaction and space accounting
//! - Behavior after close

use std::fs::{self, OpenOptions};
use std::io::Write;

use burrowkv::config::SyncStrategy;
use burrowkv::storage::{FileRecordStore, RecordStore, StoreError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, FileRecordStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = FileRecordStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap();
    (temp_dir, store)
}

fn reopen(temp_dir: &TempDir) -> FileRecordStore {
    FileRecordStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap()
}

fn log_len(temp_dir: &TempDir) -> u64 {
    fs::metadata(temp_dir.path().join("records.log")).unwrap().len()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_store_open_writes_header() {
    let (temp_dir, store) = setup_temp_store();

    assert!(store.is_empty());
    assert_eq!(log_len(&temp_dir), 6);
    let bytes = fs::read(temp_dir.path().join("records.log")).unwrap();
    assert_eq!(&bytes[..4], b"BKRS");
}

#[test]
fn test_store_put_assigns_increasing_ids() {
    let (_temp, store) = setup_temp_store();

    let a = store.put(b"first").unwrap();
    let b = store.put(b"second").unwrap();

    assert_eq!(a, 1);
    assert_eq!(b, 2);
    assert_eq!(store.get(a).unwrap(), Some(b"first".to_vec()));
    assert_eq!(store.get(b).unwrap(), Some(b"second".to_vec()));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_store_get_missing_is_none() {
    let (_temp, store) = setup_temp_store();

    assert_eq!(store.get(42).unwrap(), None);
}

#[test]
fn test_store_set_replaces_and_creates() {
    let (_temp, store) = setup_temp_store();
    let id = store.put(b"old").unwrap();

    store.set(id, b"new").unwrap();
    assert_eq!(store.get(id).unwrap(), Some(b"new".to_vec()));

    // set at an unused id writes it and moves id assignment past it
    store.set(10, b"ten").unwrap();
    assert_eq!(store.get(10).unwrap(), Some(b"ten".to_vec()));
    assert_eq!(store.put(b"next").unwrap(), 11);
}

#[test]
fn test_store_del_and_del_missing() {
    let (_temp, store) = setup_temp_store();
    let id = store.put(b"gone").unwrap();

    store.del(id).unwrap();
    store.del(id).unwrap();
    store.del(999).unwrap();

    assert_eq!(store.get(id).unwrap(), None);
    assert!(store.is_empty());
}

#[test]
fn test_store_empty_payload() {
    let (_temp, store) = setup_temp_store();

    let id = store.put(b"").unwrap();

    assert_eq!(store.get(id).unwrap(), Some(Vec::new()));
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_store_reopen_replays_log() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(&temp_dir);
        let a = store.put(b"a").unwrap();
        let b = store.put(b"b").unwrap();
        store.set(a, b"a2").unwrap();
        store.del(b).unwrap();
        store.close().unwrap();
    }

    let store = reopen(&temp_dir);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(1).unwrap(), Some(b"a2".to_vec()));
    assert_eq!(store.get(2).unwrap(), None);
    // Deleted ids are not handed out again
    assert_eq!(store.put(b"c").unwrap(), 3);
}

#[test]
fn test_store_truncates_torn_tail() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(&temp_dir);
        store.put(b"kept").unwrap();
        store.close().unwrap();
    }
    let clean_len = log_len(&temp_dir);

    // Half an entry header, as left by a crash mid-append
    let mut file = OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join("records.log"))
        .unwrap();
    file.write_all(&[1, 2, 0, 0, 0]).unwrap();
    drop(file);

    let store = reopen(&temp_dir);
    assert_eq!(store.get(1).unwrap(), Some(b"kept".to_vec()));
    assert_eq!(log_len(&temp_dir), clean_len);

    // Appends continue cleanly after the truncation point
    let id = store.put(b"after").unwrap();
    store.close().unwrap();
    let store = reopen(&temp_dir);
    assert_eq!(store.get(id).unwrap(), Some(b"after".to_vec()));
}

#[test]
fn test_store_drops_entry_with_bad_checksum() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(&temp_dir);
        store.put(b"good").unwrap();
        store.put(b"flipped").unwrap();
        store.close().unwrap();
    }

    let path = temp_dir.path().join("records.log");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let store = reopen(&temp_dir);
    assert_eq!(store.get(1).unwrap(), Some(b"good".to_vec()));
    assert_eq!(store.get(2).unwrap(), None);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_store_rejects_foreign_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("records.log"), b"NOPE-not-a-log").unwrap();

    let result = FileRecordStore::open(temp_dir.path(), SyncStrategy::EveryWrite);

    assert!(matches!(result, Err(StoreError::Corrupted(_))));
}

// =============================================================================
// Compaction Tests
// =============================================================================

#[test]
fn test_store_compact_reclaims_dead_bytes() {
    let (temp_dir, store) = setup_temp_store();
    let dropped = store.put(b"dropped").unwrap();
    let keep = store.put(b"keep").unwrap();
    let churn = store.put(b"v0").unwrap();
    for i in 1..10 {
        store.set(churn, format!("v{}", i).as_bytes()).unwrap();
    }
    store.del(dropped).unwrap();

    let before = store.stats();
    assert!(before.dead_bytes > 0);
    let len_before = log_len(&temp_dir);

    let after = store.compact().unwrap();

    assert_eq!(after.records, 2);
    assert_eq!(after.dead_bytes, 0);
    assert_eq!(after.live_bytes, before.live_bytes);
    assert!(log_len(&temp_dir) < len_before);
    assert_eq!(store.get(keep).unwrap(), Some(b"keep".to_vec()));
    assert_eq!(store.get(churn).unwrap(), Some(b"v9".to_vec()));

    // The compacted log replays to the same contents
    store.close().unwrap();
    let store = reopen(&temp_dir);
    assert_eq!(store.get(churn).unwrap(), Some(b"v9".to_vec()));
    assert_eq!(store.len(), 2);
}

#[test]
fn test_store_compact_keeps_deleted_highest_id_retired() {
    let temp_dir = TempDir::new().unwrap();

    {
        let store = reopen(&temp_dir);
        assert_eq!(store.put(b"a").unwrap(), 1);
        assert_eq!(store.put(b"b").unwrap(), 2);
        store.del(2).unwrap();

        let stats = store.compact().unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(store.put(b"c").unwrap(), 3);
        store.del(3).unwrap();
        store.compact().unwrap();
        store.close().unwrap();
    }

    let store = reopen(&temp_dir);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(2).unwrap(), None);
    assert_eq!(store.get(3).unwrap(), None);
    assert_eq!(store.put(b"d").unwrap(), 4);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_store_operations_after_close() {
    let (_temp, store) = setup_temp_store();
    let id = store.put(b"x").unwrap();

    store.close().unwrap();

    assert!(matches!(store.get(id), Err(StoreError::Closed)));
    assert!(matches!(store.put(b"y"), Err(StoreError::Closed)));
    assert!(matches!(store.del(id), Err(StoreError::Closed)));
    assert!(matches!(store.compact(), Err(StoreError::Closed)));
}
