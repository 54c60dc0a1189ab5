//! Queued data requests

use std::sync::Arc;

use crate::cursor::Segment;
use crate::error::BurrowError;
use crate::scheduler::Settle;
use crate::storage::RecordId;
use crate::value::Value;

use super::lock::Access;

/// Index resolution for one key
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub record: RecordId,
    /// Decoded record body when the caller asked for it up front
    pub value: Option<Value>,
}

/// A request waiting on the engine's data queue
pub(crate) enum Request {
    /// Resolve a key to its record (and optionally its value)
    FetchIndex {
        key: String,
        preload: bool,
        done: Settle<Option<Resolved>>,
    },

    /// Read one record on behalf of a cursor
    Fetch {
        key: String,
        record: RecordId,
        done: Settle<Option<Value>>,
    },

    /// Enumerate every stored key
    FetchAll {
        preload: bool,
        done: Settle<Vec<Segment>>,
    },

    /// Store an encoded value under a key
    Put {
        key: String,
        bytes: Arc<Vec<u8>>,
        done: Settle<()>,
    },

    /// Remove a key
    Del { key: String, done: Settle<()> },

    /// Shut the engine down once everything before it has drained
    Close { done: Settle<()> },
}

/// What a request needs from the lock table
pub(crate) enum Claim<'a> {
    Key(&'a str, Access),
    Scan,
    Exclusive,
}

impl Request {
    pub(crate) fn claim(&self) -> Claim<'_> {
        match self {
            Request::FetchIndex { key, .. } | Request::Fetch { key, .. } => {
                Claim::Key(key, Access::Read)
            }
            Request::Put { key, .. } | Request::Del { key, .. } => Claim::Key(key, Access::Write),
            Request::FetchAll { .. } => Claim::Scan,
            Request::Close { .. } => Claim::Exclusive,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Request::FetchIndex { .. } => "FETCH_INDEX",
            Request::Fetch { .. } => "FETCH",
            Request::FetchAll { .. } => "FETCH_ALL",
            Request::Put { .. } => "PUT",
            Request::Del { .. } => "DEL",
            Request::Close { .. } => "CLOSE",
        }
    }

    pub(crate) fn reject(self, error: BurrowError) {
        match self {
            Request::FetchIndex { done, .. } => done.reject(error),
            Request::Fetch { done, .. } => done.reject(error),
            Request::FetchAll { done, .. } => done.reject(error),
            Request::Put { done, .. } => done.reject(error),
            Request::Del { done, .. } => done.reject(error),
            Request::Close { done } => done.reject(error),
        }
    }
}
