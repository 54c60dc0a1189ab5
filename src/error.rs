//! Error types for burrowkv
//!
//! Every engine failure is a [`BurrowError`]: a machine-readable
//! [`ErrorCode`], the code's fixed human-readable message, and an accumulable
//! list of [`ErrorDetail`]s describing where it happened.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::RecordId;

/// Result type alias using BurrowError
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Machine-readable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // -------------------------------------------------------------------------
    // Fallback
    // -------------------------------------------------------------------------
    Unknown,

    // -------------------------------------------------------------------------
    // Initialization Errors
    // -------------------------------------------------------------------------
    StorageInit,
    IndexInit,

    // -------------------------------------------------------------------------
    // Record Access Errors
    // -------------------------------------------------------------------------
    StorageAccess,
    IndexAccess,

    // -------------------------------------------------------------------------
    // Corruption
    // -------------------------------------------------------------------------
    IndexStructure,

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    Closing,
    DuplicatedClose,
    Closed,
}

impl ErrorCode {
    /// Stable string form of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "UNKNOWN",
            ErrorCode::StorageInit => "STORAGE_INIT",
            ErrorCode::IndexInit => "INDEX_INIT",
            ErrorCode::StorageAccess => "STORAGE_ACCESS",
            ErrorCode::IndexAccess => "INDEX_ACCESS",
            ErrorCode::IndexStructure => "INDEX_STRUCTURE",
            ErrorCode::Closing => "CLOSING",
            ErrorCode::DuplicatedClose => "DUPLICATED_CLOSE",
            ErrorCode::Closed => "CLOSED",
        }
    }

    /// Human-readable message attached to every error with this code
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => "unknown error has occurred",
            ErrorCode::StorageInit => "cannot initialize database storage system",
            ErrorCode::IndexInit => "cannot initialize database index system",
            ErrorCode::StorageAccess => "cannot access database storage system",
            ErrorCode::IndexAccess => "cannot access database index system",
            ErrorCode::IndexStructure => "index contains invalid data",
            ErrorCode::Closing => "database is closing",
            ErrorCode::DuplicatedClose => "database close request has been invoked already",
            ErrorCode::Closed => "database has been closed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contextual detail attached to an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// The key the failing operation was working on
    Key(String),

    /// The key hash that was being resolved
    Hash(u32),

    /// The bucket record involved
    Bucket(RecordId),

    /// The data record involved
    Record(RecordId),

    /// A filesystem path (init failures)
    Path(PathBuf),

    /// Underlying cause, rendered to text
    Cause(String),
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::Key(key) => write!(f, "key={:?}", key),
            ErrorDetail::Hash(hash) => write!(f, "hash={}", hash),
            ErrorDetail::Bucket(id) => write!(f, "bucket={}", id),
            ErrorDetail::Record(id) => write!(f, "record={}", id),
            ErrorDetail::Path(path) => write!(f, "path={}", path.display()),
            ErrorDetail::Cause(cause) => write!(f, "cause={}", cause),
        }
    }
}

/// Unified error type for burrowkv operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {}{}", .code.message(), render_details(.details))]
pub struct BurrowError {
    code: ErrorCode,
    details: Vec<ErrorDetail>,
}

impl BurrowError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            details: Vec::new(),
        }
    }

    /// Wrap a lower-level failure under an engine code
    pub fn caused_by(code: ErrorCode, cause: impl fmt::Display) -> Self {
        Self::new(code).with(ErrorDetail::Cause(cause.to_string()))
    }

    /// Builder-style detail attachment
    pub fn with(mut self, detail: ErrorDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Attach a detail in place
    pub fn push(&mut self, detail: ErrorDetail) {
        self.details.push(detail);
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn details(&self) -> &[ErrorDetail] {
        &self.details
    }
}

impl From<ErrorCode> for BurrowError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

fn render_details(details: &[ErrorDetail]) -> String {
    if details.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = details.iter().map(|d| d.to_string()).collect();
    format!(" ({})", parts.join(", "))
}
