//! Value model and codec
//!
//! Stored values are dynamically shaped: objects, arrays, primitives and
//! binary blobs. The same model describes the engine's own bookkeeping
//! records (buckets, the root index pair list, metadata), so a single codec
//! serves both.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Buf;
use serde::{Deserialize, Serialize};

/// A structured value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Build an object from `(key, value)` pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// Deepest array/object nesting the codec accepts
pub const MAX_DEPTH: usize = 128;

/// Serialize a value to its binary form
///
/// Values nested deeper than [`MAX_DEPTH`] are refused, so everything
/// written can be read back.
pub fn encode(value: &Value) -> Result<Vec<u8>, bincode::Error> {
    if exceeds_depth(value, MAX_DEPTH) {
        return Err(too_deep());
    }
    bincode::serialize(value)
}

/// Deserialize a value from its binary form
///
/// The nesting depth is checked on the raw bytes first; bincode decodes
/// nested values recursively.
pub fn decode(bytes: &[u8]) -> Result<Value, bincode::Error> {
    if nesting_exceeds(bytes, MAX_DEPTH) {
        return Err(too_deep());
    }
    bincode::deserialize(bytes)
}

fn too_deep() -> bincode::Error {
    Box::new(bincode::ErrorKind::Custom(format!(
        "value nested deeper than {} levels",
        MAX_DEPTH
    )))
}

fn exceeds_depth(value: &Value, budget: usize) -> bool {
    match value {
        Value::Array(items) => budget == 0 || items.iter().any(|v| exceeds_depth(v, budget - 1)),
        Value::Object(map) => budget == 0 || map.values().any(|v| exceeds_depth(v, budget - 1)),
        _ => false,
    }
}

// Variant tags as bincode writes them (u32, declaration order)
const TAG_NULL: u32 = 0;
const TAG_BOOL: u32 = 1;
const TAG_INT: u32 = 2;
const TAG_FLOAT: u32 = 3;
const TAG_STRING: u32 = 4;
const TAG_BINARY: u32 = 5;
const TAG_ARRAY: u32 = 6;
const TAG_OBJECT: u32 = 7;

/// Open container while scanning: values still to read, and whether each
/// is preceded by a string key
struct Level {
    remaining: u64,
    keyed: bool,
}

/// Walk the encoded form without recursion and report whether containers
/// nest deeper than `limit`
///
/// Malformed or truncated input within the limit is left for bincode to
/// reject.
fn nesting_exceeds(bytes: &[u8], limit: usize) -> bool {
    scan_depth(bytes, limit).unwrap_or(false)
}

fn scan_depth(mut buf: &[u8], limit: usize) -> Option<bool> {
    let mut levels = vec![Level {
        remaining: 1,
        keyed: false,
    }];

    while let Some(level) = levels.last_mut() {
        if level.remaining == 0 {
            levels.pop();
            continue;
        }
        level.remaining -= 1;
        if level.keyed {
            skip_sized(&mut buf)?;
        }

        match take_u32(&mut buf)? {
            TAG_NULL => {}
            TAG_BOOL => skip(&mut buf, 1)?,
            TAG_INT | TAG_FLOAT => skip(&mut buf, 8)?,
            TAG_STRING | TAG_BINARY => skip_sized(&mut buf)?,
            tag @ (TAG_ARRAY | TAG_OBJECT) => {
                // The root placeholder is not a container
                if levels.len() > limit {
                    return Some(true);
                }
                let remaining = take_u64(&mut buf)?;
                levels.push(Level {
                    remaining,
                    keyed: tag == TAG_OBJECT,
                });
            }
            _ => return None,
        }
    }
    Some(false)
}

fn take_u32(buf: &mut &[u8]) -> Option<u32> {
    if buf.remaining() < 4 {
        return None;
    }
    Some(buf.get_u32_le())
}

fn take_u64(buf: &mut &[u8]) -> Option<u64> {
    if buf.remaining() < 8 {
        return None;
    }
    Some(buf.get_u64_le())
}

fn skip(buf: &mut &[u8], len: usize) -> Option<()> {
    if buf.remaining() < len {
        return None;
    }
    buf.advance(len);
    Some(())
}

fn skip_sized(buf: &mut &[u8]) -> Option<()> {
    let len = usize::try_from(take_u64(buf)?).ok()?;
    skip(buf, len)
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Binary(v.to_vec())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Display (JSON-like, used by the CLI)
// =============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Binary(bytes) => {
                f.write_str("<")?;
                for b in bytes {
                    write!(f, "{:02x}", b)?;
                }
                f.write_str(">")
            }
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{:?}:{}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}
