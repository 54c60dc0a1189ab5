//! Cursors over lookup results
//!
//! A cursor is produced by a completed lookup and walks its results in call
//! order. Values that were not read up front are fetched lazily: each `next`
//! queues a fetch on the engine and yields its [`Completion`].
//!
//! - [`Cursor`] yields values only
//! - [`MutableCursor`] yields `(key, value)` pairs
//!
//! A record deleted between lookup and fetch yields `None`.

use std::sync::Arc;

use crate::engine::Core;
use crate::scheduler::Completion;
use crate::storage::RecordId;
use crate::value::Value;

/// One cursor position
#[derive(Debug, Clone)]
pub(crate) enum Segment {
    /// Record reference, read on demand
    Stored { key: String, record: RecordId },

    /// Value already in hand
    Inline { key: String, value: Value },
}

impl Segment {
    fn key(&self) -> &str {
        match self {
            Segment::Stored { key, .. } | Segment::Inline { key, .. } => key,
        }
    }

    fn load(self, core: Option<&Arc<Core>>) -> (String, Completion<Option<Value>>) {
        match self {
            Segment::Inline { key, value } => (key, Completion::ready(Some(value))),
            Segment::Stored { key, record } => {
                let completion = match core {
                    Some(core) => core.fetch(key.clone(), record),
                    None => Completion::ready(None),
                };
                (key, completion)
            }
        }
    }
}

/// Shared walk state for both cursor kinds
struct Segments {
    items: std::vec::IntoIter<Segment>,
    core: Option<Arc<Core>>,
}

impl Segments {
    fn new(segments: Vec<Segment>, core: Option<Arc<Core>>) -> Self {
        Self {
            items: segments.into_iter(),
            core,
        }
    }

    fn next(&mut self) -> Option<(String, Completion<Option<Value>>)> {
        let segment = self.items.next()?;
        Some(segment.load(self.core.as_ref()))
    }
}

// =============================================================================
// Cursor
// =============================================================================

/// Values for the keys of a lookup, in call order
pub struct Cursor {
    segments: Segments,
}

impl Cursor {
    pub(crate) fn new(segments: Vec<Segment>, core: Arc<Core>) -> Self {
        Self {
            segments: Segments::new(segments, Some(core)),
        }
    }

    /// A detached cursor over values already in hand
    pub fn from_values(values: Vec<Value>) -> Self {
        let segments = values
            .into_iter()
            .map(|value| Segment::Inline {
                key: String::new(),
                value,
            })
            .collect();
        Self {
            segments: Segments::new(segments, None),
        }
    }

    /// Results not yet yielded; does not consume anything
    pub fn len(&self) -> usize {
        self.segments.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch every remaining value
    ///
    /// All fetches are queued before any is waited on. Records deleted since
    /// the lookup are left out.
    pub fn to_array(self) -> Completion<Vec<Value>> {
        let pending: Vec<_> = self.collect();
        Completion::join_all(pending).then(|values| Ok(values.into_iter().flatten().collect()))
    }
}

impl Iterator for Cursor {
    type Item = Completion<Option<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.segments.next().map(|(_, completion)| completion)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.segments.items.size_hint()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// MutableCursor
// =============================================================================

/// `(key, value)` pairs for the keys of a lookup, in call order
pub struct MutableCursor {
    segments: Segments,
}

impl MutableCursor {
    pub(crate) fn new(segments: Vec<Segment>, core: Arc<Core>) -> Self {
        Self {
            segments: Segments::new(segments, Some(core)),
        }
    }

    /// Pairs not yet yielded
    pub fn len(&self) -> usize {
        self.segments.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys not yet yielded
    pub fn keys(&self) -> Vec<String> {
        self.segments
            .items
            .as_slice()
            .iter()
            .map(|segment| segment.key().to_string())
            .collect()
    }

    /// Fetch every remaining pair; pairs whose record has gone are left out
    pub fn to_array(self) -> Completion<Vec<(String, Value)>> {
        let pending: Vec<_> = self.collect();
        Completion::join_all(pending).then(|pairs| {
            Ok(pairs
                .into_iter()
                .filter_map(|(key, value)| value.map(|value| (key, value)))
                .collect())
        })
    }
}

impl Iterator for MutableCursor {
    type Item = Completion<(String, Option<Value>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, completion) = self.segments.next()?;
        Some(completion.then(move |value| Ok((key, value))))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.segments.items.size_hint()
    }
}

impl std::fmt::Debug for MutableCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableCursor")
            .field("len", &self.len())
            .finish()
    }
}
