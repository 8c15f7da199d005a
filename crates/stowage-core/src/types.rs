//! Strong type definitions for Stowage.
//!
//! Records are plain JSON objects. Keys are a closed enum so that ordering
//! is total and identical across engines.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A record stored in an object store.
///
/// Opaque field mapping; the field named by the store's key path holds the
/// primary key.
pub type Record = serde_json::Map<String, Value>;

/// A primary key.
///
/// Numbers sort before text; within a variant the natural order applies.
/// Engine-assigned keys are always positive numbers.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    /// Integer key.
    Number(i64),
    /// String key.
    Text(String),
}

impl Key {
    /// Parse a key from a record field value.
    ///
    /// Integers and floats with an integral value become `Number`, strings
    /// become `Text`. Anything else is not a valid key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Some(Key::Number(i));
                }
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Some(Key::Number(f as i64))
                } else {
                    None
                }
            }
            Value::String(s) => Some(Key::Text(s.clone())),
            _ => None,
        }
    }

    /// The numeric value, if this is a number key.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            Key::Number(n) => Some(*n),
            Key::Text(_) => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "Key({})", n),
            Key::Text(s) => write!(f, "Key({:?})", s),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{}", n),
            Key::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Number(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Number(n as i64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::Number(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

/// Boolean coercion of a record field, with JavaScript semantics.
///
/// Missing fields, `null`, `false`, zero and the empty string are falsy.
/// Everything else, including empty arrays and objects, is truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}
