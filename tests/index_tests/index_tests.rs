//! Tests for IndexManager
//!
//! These tests verify:
//! - Key hashing stability
//! - Add/get/del against a real record store
//! - Collision handling inside a shared bucket
//! - Bucket and root lifecycle, including lazy root persistence
//! - Structure errors on corrupted buckets

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burrowkv::config::SyncStrategy;
use burrowkv::error::{ErrorCode, ErrorDetail};
use burrowkv::hash::{djb2a, key_hash};
use burrowkv::index::{IndexManager, METADATA_RECORD, ROOT_RECORD};
use burrowkv::storage::{FileRecordStore, RecordId, RecordStore, StoreError, StoreResult};
use burrowkv::value::{self, Value};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(temp_dir: &TempDir) -> Arc<FileRecordStore> {
    Arc::new(FileRecordStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap())
}

fn setup_temp_index() -> (TempDir, Arc<FileRecordStore>, IndexManager) {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    let index = IndexManager::open(store.clone(), 2).unwrap();
    (temp_dir, store, index)
}

fn persisted_root(store: &dyn RecordStore) -> Vec<Value> {
    let bytes = store.get(ROOT_RECORD).unwrap().unwrap();
    match value::decode(&bytes).unwrap() {
        Value::Array(pairs) => pairs,
        other => panic!("root is not an array: {:?}", other),
    }
}

/// File store whose writes can be switched to fail
struct FailingStore {
    inner: FileRecordStore,
    fail_writes: AtomicBool,
}

impl FailingStore {
    fn open(temp_dir: &TempDir) -> Arc<Self> {
        Arc::new(Self {
            inner: FileRecordStore::open(temp_dir.path(), SyncStrategy::EveryWrite).unwrap(),
            fail_writes: AtomicBool::new(false),
        })
    }

    fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        Ok(())
    }
}

impl RecordStore for FailingStore {
    fn get(&self, id: RecordId) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(id)
    }

    fn put(&self, data: &[u8]) -> StoreResult<RecordId> {
        self.check()?;
        self.inner.put(data)
    }

    fn set(&self, id: RecordId, data: &[u8]) -> StoreResult<()> {
        self.check()?;
        self.inner.set(id, data)
    }

    fn del(&self, id: RecordId) -> StoreResult<()> {
        self.check()?;
        self.inner.del(id)
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

// =============================================================================
// Hash Tests
// =============================================================================

#[test]
fn test_key_hash_known_values() {
    assert_eq!(djb2a(b""), 5381);
    assert_eq!(key_hash("a"), 177604);
    assert_eq!(key_hash("aaB"), 193409671);
    assert_eq!(key_hash("aba"), 193409671);
}

#[test]
fn test_key_hash_uses_utf8_bytes() {
    assert_eq!(key_hash("é"), djb2a("é".as_bytes()));
    assert_ne!(key_hash("ab"), key_hash("ba"));
}

// =============================================================================
// Initialization Tests
// =============================================================================

#[test]
fn test_index_initializes_empty_store() {
    let (_temp, store, index) = setup_temp_index();

    assert_eq!(index.bucket_count(), 0);
    assert_eq!(index.record_count(), 2);
    assert!(index.created() > 0);

    let metadata = value::decode(&store.get(METADATA_RECORD).unwrap().unwrap()).unwrap();
    let fields = metadata.as_object().unwrap();
    assert_eq!(fields.get("created").and_then(Value::as_int), Some(index.created() as i64));
    assert!(persisted_root(store.as_ref()).is_empty());
}

#[test]
fn test_index_rejects_store_without_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);
    store.put(b"not an index").unwrap();

    let err = IndexManager::open(store, 1).err().unwrap();

    assert_eq!(err.code(), ErrorCode::IndexStructure);
}

// =============================================================================
// Add / Get / Del Tests
// =============================================================================

#[test]
fn test_index_add_get() {
    let (_temp, _store, index) = setup_temp_index();

    index.add("alpha", 10).wait().unwrap();
    index.add("beta", 11).wait().unwrap();

    assert_eq!(index.get("alpha").wait().unwrap(), Some(10));
    assert_eq!(index.get("beta").wait().unwrap(), Some(11));
    assert_eq!(index.get("gamma").wait().unwrap(), None);
    assert_eq!(index.bucket_count(), 2);
}

#[test]
fn test_index_add_overwrites_entry() {
    let (_temp, _store, index) = setup_temp_index();

    index.add("k", 1).wait().unwrap();
    index.add("k", 2).wait().unwrap();

    assert_eq!(index.get("k").wait().unwrap(), Some(2));
    assert_eq!(index.bucket_count(), 1);
}

#[test]
fn test_index_del_missing_is_noop() {
    let (_temp, _store, index) = setup_temp_index();

    index.del("ghost").wait().unwrap();
    index.add("aaB", 5).wait().unwrap();
    // Same hash, different key
    index.del("aba").wait().unwrap();

    assert_eq!(index.get("aaB").wait().unwrap(), Some(5));
}

#[test]
fn test_index_collisions_share_bucket() {
    let (_temp, store, index) = setup_temp_index();

    index.add("aaB", 100).wait().unwrap();
    index.add("aba", 200).wait().unwrap();

    assert_eq!(index.bucket_count(), 1);
    // metadata + root + one bucket
    assert_eq!(store.len(), 3);
    assert_eq!(index.get("aaB").wait().unwrap(), Some(100));
    assert_eq!(index.get("aba").wait().unwrap(), Some(200));

    index.del("aba").wait().unwrap();
    assert_eq!(index.get("aaB").wait().unwrap(), Some(100));
    assert_eq!(index.get("aba").wait().unwrap(), None);
    assert_eq!(index.bucket_count(), 1);
}

#[test]
fn test_index_bucket_lifecycle() {
    let (_temp, store, index) = setup_temp_index();

    index.add("aaB", 1).wait().unwrap();
    index.add("aba", 2).wait().unwrap();
    index.del("aaB").wait().unwrap();
    index.del("aba").wait().unwrap();

    assert_eq!(index.bucket_count(), 0);
    assert_eq!(store.len(), 2);
    assert!(persisted_root(store.as_ref()).is_empty());
    assert_eq!(index.get("aaB").wait().unwrap(), None);
}

#[test]
fn test_index_root_flushed_after_write_pass() {
    let (_temp, store, index) = setup_temp_index();

    index.add("a", 7).wait().unwrap();

    let root = persisted_root(store.as_ref());
    assert_eq!(root.len(), 1);
    let pair = root[0].as_array().unwrap();
    assert_eq!(pair[0].as_int(), Some(key_hash("a") as i64));
}

#[test]
fn test_index_entries_lists_every_key() {
    let (_temp, _store, index) = setup_temp_index();

    index.add("aaB", 1).wait().unwrap();
    index.add("aba", 2).wait().unwrap();
    index.add("zed", 3).wait().unwrap();

    let mut entries = index.entries().wait().unwrap();
    entries.sort();

    assert_eq!(
        entries,
        vec![
            ("aaB".to_string(), 1),
            ("aba".to_string(), 2),
            ("zed".to_string(), 3),
        ]
    );
}

#[test]
fn test_index_batched_writes_all_land() {
    let (_temp, _store, index) = setup_temp_index();

    let writes: Vec<_> = (0..64).map(|i| index.add(&format!("key-{}", i), i)).collect();
    for write in writes {
        write.wait().unwrap();
    }

    for i in 0..64u64 {
        assert_eq!(index.get(&format!("key-{}", i)).wait().unwrap(), Some(i));
    }
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_index_reopen_restores_root() {
    let temp_dir = TempDir::new().unwrap();
    let created;

    {
        let store = open_store(&temp_dir);
        let index = IndexManager::open(store, 1).unwrap();
        index.add("aaB", 1).wait().unwrap();
        index.add("aba", 2).wait().unwrap();
        index.add("other", 3).wait().unwrap();
        created = index.created();
        index.close().unwrap();
    }

    let store = open_store(&temp_dir);
    let index = IndexManager::open(store, 1).unwrap();

    assert_eq!(index.created(), created);
    assert_eq!(index.bucket_count(), 2);
    assert_eq!(index.get("aba").wait().unwrap(), Some(2));
    assert_eq!(index.get("other").wait().unwrap(), Some(3));
}

#[test]
fn test_index_requests_after_close_fail() {
    let (_temp, _store, index) = setup_temp_index();
    index.close().unwrap();

    let err = index.get("a").wait().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Closed);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_index_corrupted_bucket_is_structure_error() {
    let (_temp, store, index) = setup_temp_index();
    index.add("victim", 1).wait().unwrap();
    index.add("bystander", 2).wait().unwrap();

    // Buckets are allocated right after the two fixed records
    let bucket_id = ROOT_RECORD + 1;
    store
        .set(bucket_id, &value::encode(&Value::Int(5)).unwrap())
        .unwrap();

    let err = index.get("victim").wait().unwrap_err();
    assert_eq!(err.code(), ErrorCode::IndexStructure);
    assert!(err.details().contains(&ErrorDetail::Key("victim".to_string())));
    assert!(err.details().contains(&ErrorDetail::Bucket(bucket_id)));
    assert!(err
        .details()
        .contains(&ErrorDetail::Hash(key_hash("victim"))));

    // Unrelated keys keep working
    assert_eq!(index.get("bystander").wait().unwrap(), Some(2));
}

#[test]
fn test_index_failed_bucket_write_leaves_no_bucket() {
    let temp_dir = TempDir::new().unwrap();
    let store = FailingStore::open(&temp_dir);
    let index = IndexManager::open(store.clone(), 1).unwrap();

    store.set_failing(true);
    let err = index.add("k", 7).wait().unwrap_err();
    store.set_failing(false);

    assert_eq!(err.code(), ErrorCode::IndexAccess);
    assert_eq!(index.bucket_count(), 0);
    assert_eq!(index.get("k").wait().unwrap(), None);
    // metadata + root only
    assert_eq!(store.len(), 2);
    assert!(persisted_root(store.as_ref()).is_empty());

    index.add("k", 7).wait().unwrap();
    assert_eq!(index.get("k").wait().unwrap(), Some(7));
    assert_eq!(index.bucket_count(), 1);
}
