//! Storage Module
//!
//! Append-oriented random-access record storage.
//!
//! ## Responsibilities
//! - Store opaque byte records under integer ids
//! - Overwrite (`set`) and delete records by id
//! - Survive crashes: torn tails are detected by CRC and truncated
//! - Reclaim dead space through compaction
//!
//! ## File Format
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │ Header (6 bytes)                                           │
//! │   Magic: "BKRS" (4) | Version: u16 (2)                     │
//! ├────────────────────────────────────────────────────────────┤
//! │ Entry                                                      │
//! │ ┌────────┬─────────┬─────────┬─────────┬────────────────┐  │
//! │ │ Op (1) │ Id (8)  │ Len (4) │ CRC (4) │ Payload (Len)  │  │
//! │ └────────┴─────────┴─────────┴─────────┴────────────────┘  │
//! │ ... repeated; later entries for an id supersede earlier ... │
//! └────────────────────────────────────────────────────────────┘
//! ```

mod file;

use thiserror::Error;

pub use file::{FileRecordStore, StoreStats};

/// Identifier of a stored record
pub type RecordId = u64;

/// Result type alias for record store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures raised by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record log corrupted: {0}")]
    Corrupted(String),

    #[error("record store is closed")]
    Closed,
}

/// Random-access record storage addressed by [`RecordId`]
///
/// Implementations must be safe to call from several threads at once; the
/// engine issues concurrent reads for unrelated keys within a drain pass.
pub trait RecordStore: Send + Sync {
    /// Read a record, `None` when the id holds nothing
    fn get(&self, id: RecordId) -> StoreResult<Option<Vec<u8>>>;

    /// Append a new record and return its freshly assigned id
    fn put(&self, data: &[u8]) -> StoreResult<RecordId>;

    /// Write a record at `id`, replacing whatever was there
    fn set(&self, id: RecordId, data: &[u8]) -> StoreResult<()>;

    /// Remove a record; removing a missing id is a no-op
    fn del(&self, id: RecordId) -> StoreResult<()>;

    /// Flush and release the store; later calls fail with `Closed`
    fn close(&self) -> StoreResult<()>;

    /// Number of live records
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
