//! Index Module
//!
//! Maps keys to data record ids through a two-level hash directory.
//!
//! ## Responsibilities
//! - Hash keys into buckets; keys sharing a hash share one bucket record
//! - Keep the root directory (hash → bucket record) in memory
//! - Persist the root lazily: once per drain pass that changed it
//! - Serialize index mutations against each other and against reads
//!
//! ## Layout in the index store
//! ```text
//! record 1   metadata       { "created": <unix millis>, "format": 1 }
//! record 2   root index     [[hash, bucket_id], ...]
//! record n   bucket         { key: data_record_id, ... }
//! ```
//!
//! ## Arbitration
//! Index requests run on their own drain queue. The class of the oldest
//! queued request decides the pass: a READ pass runs the leading run of
//! reads concurrently, a WRITE pass runs the leading run of writes one after
//! another. Everything from the first request of the other class onwards
//! waits for the next pass.

mod bucket;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{BurrowError, ErrorCode, ErrorDetail, Result};
use crate::hash::key_hash;
use crate::scheduler::{self, Completion, Consumer, DrainQueue, Settle};
use crate::storage::{RecordId, RecordStore};
use crate::value::{self, Value};

use bucket::{Bucket, RootIndex};

/// Fixed position of the engine metadata record
pub const METADATA_RECORD: RecordId = 1;

/// Fixed position of the persisted root index
pub const ROOT_RECORD: RecordId = 2;

/// Version tag written into the metadata record
const FORMAT_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockClass {
    Read,
    Write,
}

enum IndexRequest {
    Get {
        key: String,
        done: Settle<Option<RecordId>>,
    },
    Entries {
        done: Settle<Vec<(String, RecordId)>>,
    },
    Add {
        key: String,
        record: RecordId,
        done: Settle<()>,
    },
    Del {
        key: String,
        done: Settle<()>,
    },
}

impl IndexRequest {
    fn class(&self) -> LockClass {
        match self {
            IndexRequest::Get { .. } | IndexRequest::Entries { .. } => LockClass::Read,
            IndexRequest::Add { .. } | IndexRequest::Del { .. } => LockClass::Write,
        }
    }

    fn reject(self, error: BurrowError) {
        match self {
            IndexRequest::Get { done, .. } => done.reject(error),
            IndexRequest::Entries { done } => done.reject(error),
            IndexRequest::Add { done, .. } => done.reject(error),
            IndexRequest::Del { done, .. } => done.reject(error),
        }
    }
}

/// State touched by index drain passes
struct IndexState {
    store: Arc<dyn RecordStore>,
    root: RwLock<RootIndex>,
    created: u64,
}

/// Hash-bucketed key directory over a record store
pub struct IndexManager {
    state: Arc<IndexState>,
    queue: DrainQueue<IndexRequest>,
}

impl IndexManager {
    /// Load (or initialize) the index kept in `store`
    ///
    /// A store with no records is initialized with fresh metadata and an
    /// empty root; otherwise both fixed records must be present and valid.
    pub fn open(store: Arc<dyn RecordStore>, workers: usize) -> Result<Self> {
        let (root, created) = match store.get(METADATA_RECORD).map_err(index_access)? {
            None if store.is_empty() => initialize(store.as_ref())?,
            None => {
                return Err(BurrowError::new(ErrorCode::IndexStructure)
                    .with(ErrorDetail::Record(METADATA_RECORD))
                    .with(ErrorDetail::Cause("metadata record is missing".to_string())))
            }
            Some(bytes) => load(store.as_ref(), &bytes)?,
        };

        tracing::debug!(
            "Index loaded: {} buckets, created at {}",
            root.len(),
            created
        );

        let state = Arc::new(IndexState {
            store,
            root: RwLock::new(root),
            created,
        });
        let queue = DrainQueue::spawn(
            "burrowkv-index",
            IndexDrain {
                state: Arc::clone(&state),
                workers: workers.max(1),
            },
        )
        .map_err(|e| BurrowError::caused_by(ErrorCode::IndexInit, e))?;

        Ok(Self { state, queue })
    }

    /// Resolve the data record for `key`; `None` when the key is unknown
    pub fn get(&self, key: &str) -> Completion<Option<RecordId>> {
        let (done, completion) = scheduler::channel();
        self.submit(IndexRequest::Get {
            key: key.to_string(),
            done,
        });
        completion
    }

    /// Map `key` to `record`, creating its bucket when needed
    pub fn add(&self, key: &str, record: RecordId) -> Completion<()> {
        let (done, completion) = scheduler::channel();
        self.submit(IndexRequest::Add {
            key: key.to_string(),
            record,
            done,
        });
        completion
    }

    /// Remove `key`; removing an unknown key is a no-op
    pub fn del(&self, key: &str) -> Completion<()> {
        let (done, completion) = scheduler::channel();
        self.submit(IndexRequest::Del {
            key: key.to_string(),
            done,
        });
        completion
    }

    /// Every `(key, record)` pair, ordered by hash then key
    pub fn entries(&self) -> Completion<Vec<(String, RecordId)>> {
        let (done, completion) = scheduler::channel();
        self.submit(IndexRequest::Entries { done });
        completion
    }

    /// Number of buckets in the root index
    pub fn bucket_count(&self) -> usize {
        self.state.root.read().len()
    }

    /// Live records in the index store (metadata and root included)
    pub fn record_count(&self) -> usize {
        self.state.store.len()
    }

    /// Creation time recorded in the metadata (unix millis)
    pub fn created(&self) -> u64 {
        self.state.created
    }

    /// Stop the index queue, flush the root and close the index store
    ///
    /// Callers must make sure no index request is still outstanding.
    pub fn close(&self) -> Result<()> {
        self.queue.stop();
        self.queue.join();
        self.state.flush_root()?;
        self.state.store.close().map_err(index_access)
    }

    fn submit(&self, request: IndexRequest) {
        if let Err(request) = self.queue.push(request) {
            request.reject(BurrowError::new(ErrorCode::Closed));
        }
    }
}

// =============================================================================
// Drain Pass
// =============================================================================

struct IndexDrain {
    state: Arc<IndexState>,
    workers: usize,
}

impl Consumer<IndexRequest> for IndexDrain {
    fn drain(&mut self, queue: &mut VecDeque<IndexRequest>) -> bool {
        let class = match queue.front() {
            Some(request) => request.class(),
            None => return true,
        };
        let run = queue.iter().take_while(|r| r.class() == class).count();
        let granted: Vec<IndexRequest> = queue.drain(..run).collect();

        match class {
            LockClass::Read => {
                let state = &self.state;
                scheduler::run_concurrently(granted, self.workers, |request| {
                    state.execute_read(request)
                });
            }
            LockClass::Write => {
                let outcomes: Vec<(Settle<()>, Result<()>)> = granted
                    .into_iter()
                    .filter_map(|request| self.state.execute_write(request))
                    .collect();

                // Writes are acknowledged only once the root reflecting them is stored
                match self.state.flush_root() {
                    Ok(()) => {
                        for (done, result) in outcomes {
                            done.settle(result);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Root index flush failed: {}", e);
                        for (done, result) in outcomes {
                            done.settle(result.and(Err(e.clone())));
                        }
                    }
                }
            }
        }
        true
    }

    fn abandon(&mut self, request: IndexRequest) {
        request.reject(BurrowError::new(ErrorCode::Closed));
    }
}

impl IndexState {
    fn execute_read(&self, request: IndexRequest) {
        match request {
            IndexRequest::Get { key, done } => done.settle(self.lookup(&key)),
            IndexRequest::Entries { done } => done.settle(self.entries()),
            write => {
                if let Some((done, result)) = self.execute_write(write) {
                    done.settle(result);
                }
            }
        }
    }

    /// Apply a mutation; the acknowledgement is returned for the caller to
    /// settle after the root flush
    fn execute_write(&self, request: IndexRequest) -> Option<(Settle<()>, Result<()>)> {
        match request {
            IndexRequest::Add { key, record, done } => Some((done, self.insert(&key, record))),
            IndexRequest::Del { key, done } => Some((done, self.remove(&key))),
            read => {
                self.execute_read(read);
                None
            }
        }
    }

    fn lookup(&self, key: &str) -> Result<Option<RecordId>> {
        let hash = key_hash(key);
        let bucket_id = match self.root.read().bucket_for(hash) {
            Some(id) => id,
            None => return Ok(None),
        };
        let bucket = self.load_bucket(key, hash, bucket_id)?;
        Ok(bucket.get(key))
    }

    /// A new bucket is written with its first key already in it and only
    /// registered once stored, so the root never names an empty bucket
    fn insert(&self, key: &str, record: RecordId) -> Result<()> {
        let hash = key_hash(key);
        let existing = self.root.read().bucket_for(hash);

        match existing {
            Some(bucket_id) => {
                let mut bucket = self.load_bucket(key, hash, bucket_id)?;
                bucket.insert(key, record);
                self.store_bucket(key, hash, bucket_id, &bucket)
            }
            None => {
                let mut bucket = Bucket::default();
                bucket.insert(key, record);
                let bytes = bucket.encode().map_err(|e| index_failure(key, hash, e))?;
                let bucket_id = self
                    .store
                    .put(&bytes)
                    .map_err(|e| index_failure(key, hash, e))?;
                self.root.write().register(hash, bucket_id);
                tracing::trace!("Created bucket {} for hash {}", bucket_id, hash);
                Ok(())
            }
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        let hash = key_hash(key);
        let bucket_id = match self.root.read().bucket_for(hash) {
            Some(id) => id,
            None => return Ok(()),
        };

        let mut bucket = self.load_bucket(key, hash, bucket_id)?;
        if bucket.remove(key).is_none() {
            return Ok(());
        }

        if bucket.is_empty() {
            self.store
                .del(bucket_id)
                .map_err(|e| index_failure(key, hash, e).with(ErrorDetail::Bucket(bucket_id)))?;
            self.root.write().unregister(hash);
            tracing::trace!("Removed empty bucket {} for hash {}", bucket_id, hash);
            Ok(())
        } else {
            self.store_bucket(key, hash, bucket_id, &bucket)
        }
    }

    fn entries(&self) -> Result<Vec<(String, RecordId)>> {
        let buckets = self.root.read().snapshot();
        let mut entries = Vec::new();
        for (hash, bucket_id) in buckets {
            let bucket = self.load_bucket("", hash, bucket_id)?;
            entries.extend(bucket.iter().map(|(k, &id)| (k.clone(), id)));
        }
        Ok(entries)
    }

    fn load_bucket(&self, key: &str, hash: u32, bucket_id: RecordId) -> Result<Bucket> {
        let bytes = self
            .store
            .get(bucket_id)
            .map_err(|e| index_failure(key, hash, e).with(ErrorDetail::Bucket(bucket_id)))?;

        let decoded = match bytes {
            Some(bytes) => Bucket::decode(&bytes),
            None => Err("bucket record is missing".to_string()),
        };
        decoded.map_err(|cause| {
            tracing::warn!(
                "Corrupted bucket {} (hash {}, key {:?}): {}",
                bucket_id,
                hash,
                key,
                cause
            );
            BurrowError::new(ErrorCode::IndexStructure)
                .with(ErrorDetail::Key(key.to_string()))
                .with(ErrorDetail::Hash(hash))
                .with(ErrorDetail::Bucket(bucket_id))
                .with(ErrorDetail::Cause(cause))
        })
    }

    fn store_bucket(&self, key: &str, hash: u32, bucket_id: RecordId, bucket: &Bucket) -> Result<()> {
        let bytes = bucket
            .encode()
            .map_err(|e| index_failure(key, hash, e).with(ErrorDetail::Bucket(bucket_id)))?;
        self.store
            .set(bucket_id, &bytes)
            .map_err(|e| index_failure(key, hash, e).with(ErrorDetail::Bucket(bucket_id)))
    }

    /// Persist the root if a pass changed it, then clear the dirty flag
    fn flush_root(&self) -> Result<()> {
        let mut root = self.root.write();
        if !root.is_dirty() {
            return Ok(());
        }
        let bytes = value::encode(&root.to_value()).map_err(index_access)?;
        self.store.set(ROOT_RECORD, &bytes).map_err(index_access)?;
        root.clear_dirty();
        tracing::debug!("Flushed root index ({} buckets)", root.len());
        Ok(())
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Write metadata and an empty root into a fresh store
fn initialize(store: &dyn RecordStore) -> Result<(RootIndex, u64)> {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let metadata = Value::object([
        ("created", Value::Int(created as i64)),
        ("format", Value::Int(FORMAT_VERSION)),
    ]);
    let root = RootIndex::default();

    let metadata_bytes = value::encode(&metadata).map_err(index_init)?;
    let root_bytes = value::encode(&root.to_value()).map_err(index_init)?;
    let metadata_id = store.put(&metadata_bytes).map_err(index_init)?;
    let root_id = store.put(&root_bytes).map_err(index_init)?;

    if metadata_id != METADATA_RECORD || root_id != ROOT_RECORD {
        return Err(BurrowError::new(ErrorCode::IndexInit).with(ErrorDetail::Cause(format!(
            "fresh index store assigned ids {} and {}",
            metadata_id, root_id
        ))));
    }

    tracing::info!("Initialized new index (created {})", created);
    Ok((root, created))
}

/// Read back metadata and the persisted root
fn load(store: &dyn RecordStore, metadata_bytes: &[u8]) -> Result<(RootIndex, u64)> {
    let metadata = value::decode(metadata_bytes).map_err(|e| structure(METADATA_RECORD, e))?;
    let created = metadata
        .as_object()
        .and_then(|m| m.get("created"))
        .and_then(Value::as_int)
        .ok_or_else(|| structure(METADATA_RECORD, "metadata has no creation time"))?;

    let root_bytes = store
        .get(ROOT_RECORD)
        .map_err(index_access)?
        .ok_or_else(|| structure(ROOT_RECORD, "root index record is missing"))?;
    let root_value = value::decode(&root_bytes).map_err(|e| structure(ROOT_RECORD, e))?;
    let root = RootIndex::from_value(&root_value).map_err(|e| structure(ROOT_RECORD, e))?;

    Ok((root, created.max(0) as u64))
}

fn index_init(cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::caused_by(ErrorCode::IndexInit, cause)
}

fn index_access(cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::caused_by(ErrorCode::IndexAccess, cause)
}

fn index_failure(key: &str, hash: u32, cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::new(ErrorCode::IndexAccess)
        .with(ErrorDetail::Key(key.to_string()))
        .with(ErrorDetail::Hash(hash))
        .with(ErrorDetail::Cause(cause.to_string()))
}

fn structure(record: RecordId, cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::new(ErrorCode::IndexStructure)
        .with(ErrorDetail::Record(record))
        .with(ErrorDetail::Cause(cause.to_string()))
}
