//! Buckets and the root index
//!
//! A bucket maps every key sharing one hash to its data record. The root
//! index maps hashes to bucket records and is persisted as a flat list of
//! `[hash, bucket_id]` pairs.

use std::collections::{BTreeMap, HashMap};

use crate::storage::RecordId;
use crate::value::{self, Value};

/// Key → data record mapping for one hash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Bucket {
    entries: BTreeMap<String, RecordId>,
}

impl Bucket {
    /// Decode a bucket record; any non-object shape is corruption
    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, String> {
        let decoded = value::decode(bytes).map_err(|e| format!("undecodable bucket: {}", e))?;
        let map = match decoded {
            Value::Object(map) => map,
            other => {
                return Err(format!(
                    "bucket deserialized to {} instead of an object",
                    other.kind()
                ))
            }
        };

        let mut entries = BTreeMap::new();
        for (key, id) in map {
            match id.as_int() {
                Some(n) if n > 0 => {
                    entries.insert(key, n as RecordId);
                }
                _ => {
                    return Err(format!(
                        "bucket entry for {:?} holds {} instead of a record id",
                        key,
                        id.kind()
                    ))
                }
            }
        }
        Ok(Self { entries })
    }

    pub(crate) fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        let map = self
            .entries
            .iter()
            .map(|(k, &id)| (k.clone(), Value::Int(id as i64)))
            .collect();
        value::encode(&Value::Object(map))
    }

    pub(crate) fn get(&self, key: &str) -> Option<RecordId> {
        self.entries.get(key).copied()
    }

    pub(crate) fn insert(&mut self, key: &str, id: RecordId) -> Option<RecordId> {
        self.entries.insert(key.to_string(), id)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<RecordId> {
        self.entries.remove(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &RecordId)> {
        self.entries.iter()
    }
}

/// In-memory hash → bucket directory with its dirty marker
#[derive(Debug, Default)]
pub(crate) struct RootIndex {
    buckets: HashMap<u32, RecordId>,
    dirty: bool,
}

impl RootIndex {
    /// Parse the persisted `[[hash, bucket_id], ...]` form
    pub(crate) fn from_value(value: &Value) -> Result<Self, String> {
        let pairs = value
            .as_array()
            .ok_or_else(|| format!("root index is {} instead of an array", value.kind()))?;

        let mut buckets = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let parsed = pair.as_array().and_then(|items| match items {
                [hash, bucket] => Some((hash.as_int()?, bucket.as_int()?)),
                _ => None,
            });
            match parsed {
                Some((hash, bucket)) if (0..=u32::MAX as i64).contains(&hash) && bucket > 0 => {
                    buckets.insert(hash as u32, bucket as RecordId);
                }
                _ => return Err(format!("malformed root index pair: {}", pair)),
            }
        }
        Ok(Self {
            buckets,
            dirty: false,
        })
    }

    /// Persisted form, sorted by hash so equal indexes encode identically
    pub(crate) fn to_value(&self) -> Value {
        Value::Array(
            self.snapshot()
                .into_iter()
                .map(|(hash, bucket)| {
                    Value::Array(vec![Value::Int(hash as i64), Value::Int(bucket as i64)])
                })
                .collect(),
        )
    }

    pub(crate) fn bucket_for(&self, hash: u32) -> Option<RecordId> {
        self.buckets.get(&hash).copied()
    }

    /// Register a new bucket and mark the root dirty
    pub(crate) fn register(&mut self, hash: u32, bucket: RecordId) {
        self.buckets.insert(hash, bucket);
        self.dirty = true;
    }

    /// Drop a bucket and mark the root dirty
    pub(crate) fn unregister(&mut self, hash: u32) -> Option<RecordId> {
        let removed = self.buckets.remove(&hash);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    /// All `(hash, bucket)` pairs sorted by hash
    pub(crate) fn snapshot(&self) -> Vec<(u32, RecordId)> {
        let mut pairs: Vec<(u32, RecordId)> = self.buckets.iter().map(|(&h, &b)| (h, b)).collect();
        pairs.sort_unstable();
        pairs
    }
}
