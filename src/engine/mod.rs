//! Engine Module
//!
//! The storage engine that coordinates the index, the data records and the
//! request queue.
//!
//! ## Responsibilities
//! - Accept get/put/del/close from any thread as queued requests
//! - Arbitrate per-key locks once per drain pass
//! - Run granted requests for distinct keys side by side
//! - Resolve keys through the [`IndexManager`], bodies through the record store
//! - Order shutdown after every request queued before it
//!
//! ## Request Flow
//! ```text
//!   get/put/del ──► data queue ──► drain pass ──► LockTable
//!                                     │             ├─ granted ─► execute (concurrent)
//!                                     │             └─ refused ─► stays queued
//!                                     ▼
//!                       IndexManager (own queue) + storage record store
//! ```

mod keys;
mod lock;
mod request;

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::cursor::{Cursor, MutableCursor, Segment};
use crate::error::{BurrowError, ErrorCode, ErrorDetail, Result};
use crate::index::IndexManager;
use crate::scheduler::{self, Completion, Consumer, DrainQueue};
use crate::storage::{FileRecordStore, RecordId, RecordStore};
use crate::value::{self, Value};

pub use keys::Keys;

use lock::LockTable;
use request::{Claim, Request, Resolved};

/// Lifecycle state of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ok,
    Closing,
    Closed,
}

/// Options for [`Engine::init_from_path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions {
    /// Create the directory when it does not exist
    pub auto_create: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self { auto_create: true }
    }
}

/// Options for key lookups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Read record bodies while resolving keys, so the cursor carries values
    /// inline instead of fetching them on `next`
    pub preload: bool,
}

impl GetOptions {
    pub fn preload() -> Self {
        Self { preload: true }
    }
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Live records in the data store
    pub data_records: usize,

    /// Live records in the index store (metadata, root, buckets)
    pub index_records: usize,

    /// Buckets referenced by the root index
    pub buckets: usize,

    /// Creation time of the database (unix millis)
    pub created: u64,
}

/// The main storage engine
///
/// ## Concurrency Model: queue-ordered lock arbitration
///
/// - Every operation becomes a request on one queue drained by one worker
///   thread, one pass at a time
/// - A pass grants READ/WRITE locks per key in arrival order; refused
///   requests wait for a later pass, so operations on one key never overtake
///   each other
/// - Granted requests touch distinct keys (or only read), so they run
///   concurrently within the pass
///
/// The handle is cheap to share behind an `Arc`. Dropping the last handle
/// (engine or cursor) closes the engine if `close` was never called.
pub struct Engine {
    core: Arc<Core>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const INDEX_DIR: &'static str = "index";
    const STORAGE_DIR: &'static str = "storage";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Check (or create) the data directory
    /// 2. Open the index and storage record stores
    /// 3. Load metadata and the root index, initializing them when empty
    /// 4. Start the data queue worker
    pub fn open(config: Config) -> Result<Self> {
        let dir = config.data_dir.clone();
        prepare_dir(&dir, config.auto_create)?;

        let index_dir = dir.join(Self::INDEX_DIR);
        let index_store = FileRecordStore::open(&index_dir, config.sync_strategy)
            .map_err(|e| init_failure(ErrorCode::IndexInit, &index_dir, e))?;

        let storage_dir = dir.join(Self::STORAGE_DIR);
        let storage_store = FileRecordStore::open(&storage_dir, config.sync_strategy)
            .map_err(|e| init_failure(ErrorCode::StorageInit, &storage_dir, e))?;

        if config.compact_on_open {
            index_store
                .compact()
                .map_err(|e| init_failure(ErrorCode::IndexInit, &index_dir, e))?;
            storage_store
                .compact()
                .map_err(|e| init_failure(ErrorCode::StorageInit, &storage_dir, e))?;
        }

        Self::with_stores(config, Arc::new(index_store), Arc::new(storage_store))
    }

    /// Open an engine over already-opened record stores
    ///
    /// Nothing is created under `config.data_dir`; the stores are used as
    /// given and closed together with the engine.
    pub fn with_stores(
        config: Config,
        index_store: Arc<dyn RecordStore>,
        storage: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        let index = IndexManager::open(index_store, config.drain_concurrency)?;

        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::Closed),
            storage,
            index,
            config,
        });
        let queue = DrainQueue::spawn(
            "burrowkv-data",
            DataDrain {
                shared: Arc::clone(&shared),
            },
        )
        .map_err(|e| BurrowError::caused_by(ErrorCode::StorageInit, e))?;

        *shared.state.lock() = EngineState::Ok;
        tracing::info!(
            "Engine opened at {} ({} data records, {} buckets)",
            shared.config.data_dir.display(),
            shared.storage.len(),
            shared.index.bucket_count()
        );

        Ok(Self {
            core: Arc::new(Core { shared, queue }),
        })
    }

    /// Open the database rooted at `path`
    ///
    /// Uses the default config with the given directory
    pub fn init_from_path(path: impl AsRef<Path>, options: InitOptions) -> Result<Self> {
        let config = Config::builder()
            .data_dir(path.as_ref())
            .auto_create(options.auto_create)
            .build();
        Self::open(config)
    }

    /// Look up one or more keys
    ///
    /// Missing keys contribute nothing; duplicate keys share one lookup and
    /// appear once per position.
    pub fn get(&self, keys: impl Into<Keys>) -> Completion<Cursor> {
        let core = Arc::clone(&self.core);
        self.resolve(keys.into(), false)
            .then(move |segments| Ok(Cursor::new(segments, core)))
    }

    /// Look up keys, keeping each value paired with its key
    pub fn get_mutable(&self, keys: impl Into<Keys>, options: GetOptions) -> Completion<MutableCursor> {
        let core = Arc::clone(&self.core);
        self.resolve(keys.into(), options.preload)
            .then(move |segments| Ok(MutableCursor::new(segments, core)))
    }

    /// Enumerate every stored key
    pub fn get_all(&self, options: GetOptions) -> Completion<MutableCursor> {
        if let Err(e) = self.core.admit() {
            return Completion::failed(e);
        }
        let (done, completion) = scheduler::channel();
        self.core.submit(Request::FetchAll {
            preload: options.preload,
            done,
        });
        let core = Arc::clone(&self.core);
        completion.then(move |segments| Ok(MutableCursor::new(segments, core)))
    }

    /// Store `value` under every key
    ///
    /// The value is encoded once; each key gets its own record.
    pub fn put(&self, keys: impl Into<Keys>, value: impl Into<Value>) -> Completion<()> {
        if let Err(e) = self.core.admit() {
            return Completion::failed(e);
        }
        let bytes = match value::encode(&value.into()) {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => return Completion::failed(BurrowError::caused_by(ErrorCode::StorageAccess, e)),
        };

        let (distinct, _) = keys.into().dedupe();
        let writes = distinct
            .into_iter()
            .map(|key| {
                let (done, completion) = scheduler::channel();
                self.core.submit(Request::Put {
                    key,
                    bytes: Arc::clone(&bytes),
                    done,
                });
                completion
            })
            .collect();
        Completion::join_all(writes).then(|_| Ok(()))
    }

    /// Remove every key; missing keys are ignored
    pub fn del(&self, keys: impl Into<Keys>) -> Completion<()> {
        if let Err(e) = self.core.admit() {
            return Completion::failed(e);
        }
        let (distinct, _) = keys.into().dedupe();
        let deletes = distinct
            .into_iter()
            .map(|key| {
                let (done, completion) = scheduler::channel();
                self.core.submit(Request::Del { key, done });
                completion
            })
            .collect();
        Completion::join_all(deletes).then(|_| Ok(()))
    }

    /// Close the engine after everything queued so far has drained
    ///
    /// - open: starts closing
    /// - already closing: fails with `DUPLICATED_CLOSE`
    /// - already closed: succeeds immediately
    pub fn close(&self) -> Completion<()> {
        self.core.close()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> EngineState {
        *self.core.shared.state.lock()
    }

    pub fn stats(&self) -> EngineStats {
        let shared = &self.core.shared;
        EngineStats {
            data_records: shared.storage.len(),
            index_records: shared.index.record_count(),
            buckets: shared.index.bucket_count(),
            created: shared.index.created(),
        }
    }

    /// Requests queued or deferred on the data queue
    pub fn pending(&self) -> usize {
        self.core.queue.len()
    }

    pub fn data_dir(&self) -> &Path {
        &self.core.shared.config.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.core.shared.config
    }

    /// Resolve keys into cursor segments, in call order
    fn resolve(&self, keys: Keys, preload: bool) -> Completion<Vec<Segment>> {
        if let Err(e) = self.core.admit() {
            return Completion::failed(e);
        }
        let (distinct, positions) = keys.dedupe();
        let lookups: Vec<Completion<Option<Resolved>>> = distinct
            .iter()
            .map(|key| {
                let (done, completion) = scheduler::channel();
                self.core.submit(Request::FetchIndex {
                    key: key.clone(),
                    preload,
                    done,
                });
                completion
            })
            .collect();

        Completion::join_all(lookups).then(move |resolved| {
            let segments = positions
                .into_iter()
                .filter_map(|slot| {
                    let found = resolved[slot].as_ref()?;
                    let key = distinct[slot].clone();
                    Some(match &found.value {
                        Some(value) => Segment::Inline {
                            key,
                            value: value.clone(),
                        },
                        None => Segment::Stored {
                            key,
                            record: found.record,
                        },
                    })
                })
                .collect();
            Ok(segments)
        })
    }
}

// =============================================================================
// Core (shared by the engine handle and its cursors)
// =============================================================================

pub(crate) struct Core {
    shared: Arc<Shared>,
    queue: DrainQueue<Request>,
}

impl Core {
    fn admit(&self) -> Result<()> {
        match *self.shared.state.lock() {
            EngineState::Ok => Ok(()),
            EngineState::Closing => Err(BurrowError::new(ErrorCode::Closing)),
            EngineState::Closed => Err(BurrowError::new(ErrorCode::Closed)),
        }
    }

    fn submit(&self, request: Request) {
        if let Err(e) = self.admit() {
            request.reject(e);
            return;
        }
        if let Err(request) = self.queue.push(request) {
            request.reject(BurrowError::new(ErrorCode::Closed));
        }
    }

    /// Read one record for a cursor
    pub(crate) fn fetch(&self, key: String, record: RecordId) -> Completion<Option<Value>> {
        let (done, completion) = scheduler::channel();
        self.submit(Request::Fetch { key, record, done });
        completion
    }

    fn close(&self) -> Completion<()> {
        {
            let mut state = self.shared.state.lock();
            match *state {
                EngineState::Closed => return Completion::ready(()),
                EngineState::Closing => {
                    return Completion::failed(BurrowError::new(ErrorCode::DuplicatedClose))
                }
                EngineState::Ok => *state = EngineState::Closing,
            }
        }

        tracing::info!("Engine closing, {} requests still queued", self.queue.len());
        let (done, completion) = scheduler::channel();
        if let Err(request) = self.queue.push(Request::Close { done }) {
            request.reject(BurrowError::new(ErrorCode::Closed));
        }
        completion
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        if *self.shared.state.lock() == EngineState::Ok {
            if let Err(e) = self.close().wait() {
                tracing::warn!("Closing engine on drop failed: {}", e);
            }
        }
        self.queue.join();
    }
}

// =============================================================================
// Drain Pass
// =============================================================================

struct Shared {
    state: Mutex<EngineState>,
    storage: Arc<dyn RecordStore>,
    index: IndexManager,
    config: Config,
}

struct DataDrain {
    shared: Arc<Shared>,
}

impl Consumer<Request> for DataDrain {
    fn drain(&mut self, queue: &mut VecDeque<Request>) -> bool {
        let queued = queue.len();
        let mut locks = LockTable::default();
        let mut granted = Vec::new();
        let mut deferred = VecDeque::new();
        let mut close = None;

        for request in queue.drain(..) {
            let admitted = match request.claim() {
                Claim::Key(key, access) => locks.acquire(key, access),
                Claim::Scan => locks.acquire_scan(),
                // Close runs only once nothing else is left
                Claim::Exclusive => queued == 1,
            };
            if !admitted {
                tracing::trace!("Deferred {} to the next pass", request.kind());
                deferred.push_back(request);
            } else if let Request::Close { done } = request {
                close = Some(done);
            } else {
                granted.push(request);
            }
        }
        *queue = deferred;

        if !granted.is_empty() {
            tracing::debug!(
                "Data pass: {} queued, {} granted, {} deferred",
                queued,
                granted.len(),
                queue.len()
            );
            let shared = &self.shared;
            scheduler::run_concurrently(granted, shared.config.drain_concurrency, |request| {
                shared.execute(request)
            });
        }

        match close {
            Some(done) => {
                done.settle(self.shared.shutdown());
                false
            }
            None => true,
        }
    }

    fn abandon(&mut self, request: Request) {
        request.reject(BurrowError::new(ErrorCode::Closed));
    }
}

impl Shared {
    fn execute(&self, request: Request) {
        match request {
            Request::FetchIndex { key, preload, done } => done.settle(self.lookup(&key, preload)),
            Request::Fetch { key, record, done } => done.settle(self.read_record(&key, record)),
            Request::FetchAll { preload, done } => done.settle(self.scan(preload)),
            Request::Put { key, bytes, done } => done.settle(self.write(&key, &bytes)),
            Request::Del { key, done } => done.settle(self.remove(&key)),
            // Arbitration never grants Close alongside other requests
            Request::Close { done } => done.settle(self.shutdown()),
        }
    }

    fn lookup(&self, key: &str, preload: bool) -> Result<Option<Resolved>> {
        let record = match self.index.get(key).wait()? {
            Some(record) => record,
            None => return Ok(None),
        };
        if !preload {
            return Ok(Some(Resolved {
                record,
                value: None,
            }));
        }
        Ok(self
            .read_record(key, record)?
            .map(|value| Resolved {
                record,
                value: Some(value),
            }))
    }

    fn read_record(&self, key: &str, record: RecordId) -> Result<Option<Value>> {
        let bytes = match self
            .storage
            .get(record)
            .map_err(|e| storage_failure(key, record, e))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        value::decode(&bytes)
            .map(Some)
            .map_err(|e| storage_failure(key, record, e))
    }

    fn scan(&self, preload: bool) -> Result<Vec<Segment>> {
        let entries = self.index.entries().wait()?;
        let mut segments = Vec::with_capacity(entries.len());
        for (key, record) in entries {
            if !preload {
                segments.push(Segment::Stored { key, record });
                continue;
            }
            if let Some(value) = self.read_record(&key, record)? {
                segments.push(Segment::Inline { key, value });
            }
        }
        Ok(segments)
    }

    /// Overwrite in place when the key exists, otherwise append and index
    fn write(&self, key: &str, bytes: &[u8]) -> Result<()> {
        if let Some(record) = self.index.get(key).wait()? {
            return self
                .storage
                .set(record, bytes)
                .map_err(|e| storage_failure(key, record, e));
        }

        let record = self.storage.put(bytes).map_err(|e| {
            BurrowError::caused_by(ErrorCode::StorageAccess, e).with(ErrorDetail::Key(key.to_string()))
        })?;
        if let Err(e) = self.index.add(key, record).wait() {
            // Do not leave an unreachable record behind
            if let Err(cleanup) = self.storage.del(record) {
                tracing::warn!("Orphaned record {} for key {:?}: {}", record, key, cleanup);
            }
            return Err(e);
        }
        tracing::trace!("Stored key {:?} as record {}", key, record);
        Ok(())
    }

    /// Unlink the key before dropping its record; an indexed key never
    /// points at a deleted record
    fn remove(&self, key: &str) -> Result<()> {
        let record = match self.index.get(key).wait()? {
            Some(record) => record,
            None => return Ok(()),
        };
        self.index.del(key).wait()?;
        self.storage
            .del(record)
            .map_err(|e| storage_failure(key, record, e))
    }

    /// Stop the index, close both stores and mark the engine closed
    fn shutdown(&self) -> Result<()> {
        let index_result = self.index.close();
        let storage_result = self
            .storage
            .close()
            .map_err(|e| BurrowError::caused_by(ErrorCode::StorageAccess, e));
        *self.state.lock() = EngineState::Closed;
        tracing::info!("Engine closed");
        index_result.and(storage_result)
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

fn prepare_dir(dir: &Path, auto_create: bool) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    if !auto_create {
        return Err(BurrowError::new(ErrorCode::StorageInit)
            .with(ErrorDetail::Path(dir.to_path_buf()))
            .with(ErrorDetail::Cause("directory does not exist".to_string())));
    }
    fs::create_dir_all(dir).map_err(|e| init_failure(ErrorCode::StorageInit, dir, e))
}

fn init_failure(code: ErrorCode, path: &Path, cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::caused_by(code, cause).with(ErrorDetail::Path(path.to_path_buf()))
}

fn storage_failure(key: &str, record: RecordId, cause: impl std::fmt::Display) -> BurrowError {
    BurrowError::caused_by(ErrorCode::StorageAccess, cause)
        .with(ErrorDetail::Key(key.to_string()))
        .with(ErrorDetail::Record(record))
}
