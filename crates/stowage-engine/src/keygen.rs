//! Auto-increment key generation shared by the engines.
//!
//! The generator of a store starts at 1 and only moves forward: explicit
//! numeric keys at or above it push it past themselves, and deleted keys
//! are never handed out again.

use serde_json::Value;
use stowage_core::{Key, Record};

use crate::error::{EngineError, Result};

/// A record ready to be written, with its key and the generator's next value.
#[derive(Debug)]
pub(crate) struct PreparedWrite {
    pub key: Key,
    pub record: Record,
    pub next_key: i64,
}

/// Resolve the key of `record` against the store's generator.
///
/// When the key field is missing or `null`, the generator value is used and
/// injected into the record. The caller persists `next_key` only if the
/// write succeeds.
pub(crate) fn prepare_write(
    store: &str,
    key_path: &str,
    next_key: i64,
    mut record: Record,
) -> Result<PreparedWrite> {
    match record.get(key_path) {
        Some(value) if !value.is_null() => {
            let key = Key::from_value(value).ok_or_else(|| EngineError::InvalidKey {
                store: store.to_string(),
                reason: format!("field {key_path} holds {value}, which is not a valid key"),
            })?;
            let next_key = match key {
                Key::Number(n) if n >= next_key => n.saturating_add(1),
                _ => next_key,
            };
            Ok(PreparedWrite {
                key,
                record,
                next_key,
            })
        }
        _ => {
            let generated = next_key;
            let next_key = generated.checked_add(1).ok_or_else(|| EngineError::InvalidKey {
                store: store.to_string(),
                reason: "key generator exhausted".to_string(),
            })?;
            record.insert(key_path.to_string(), Value::from(generated));
            Ok(PreparedWrite {
                key: Key::Number(generated),
                record,
                next_key,
            })
        }
    }
}
