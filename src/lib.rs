//! # burrowkv
//!
//! An embedded key-value engine with:
//! - Append-only record stores with checksummed entries and torn-tail recovery
//! - A hash-bucketed index with lazily flushed root directory
//! - Queue-ordered per-key lock arbitration (no lost updates, no stale reads)
//! - Lazy cursors over lookup results
//! - A TCP protocol and server layered on the engine
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TCP Server / Embedded Caller                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ get / put / del / close
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Engine (data queue)                         │
//! │         per-pass LockTable, concurrent execution             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │IndexManager │          │ data store  │
//!   │(index queue)│          │  (records)  │
//!   └──────┬──────┘          └─────────────┘
//!          │
//!          ▼
//!   ┌─────────────┐
//!   │ index store │
//!   │root, buckets│
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod hash;
pub mod value;
pub mod scheduler;
pub mod storage;
pub mod index;
pub mod cursor;
pub mod engine;
pub mod protocol;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BurrowError, ErrorCode, ErrorDetail, Result};
pub use config::{Config, SyncStrategy};
pub use cursor::{Cursor, MutableCursor};
pub use engine::{Engine, EngineState, EngineStats, GetOptions, InitOptions, Keys};
pub use scheduler::Completion;
pub use value::Value;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of burrowkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
