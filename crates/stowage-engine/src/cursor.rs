//! Key ranges and ascending cursors over a transaction scope.
//!
//! A cursor only remembers the last key it visited. Each step seeks the
//! first key strictly after it, so deleting the current record never makes
//! the cursor skip the next one.

use std::ops::Bound;

use stowage_core::{Key, Record};

use crate::error::Result;
use crate::traits::Scope;

/// Bounds of a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Key>,
    pub upper: Bound<Key>,
}

impl KeyRange {
    /// Numeric keys `>= 1`: the range covered by store scans.
    ///
    /// Key 0, negative keys and text keys fall outside it.
    pub fn scan() -> Self {
        Self {
            lower: Bound::Included(Key::Number(1)),
            upper: Bound::Included(Key::Number(i64::MAX)),
        }
    }

    /// The remainder of this range strictly after `key`.
    pub fn after(&self, key: &Key) -> Self {
        Self {
            lower: Bound::Excluded(key.clone()),
            upper: self.upper.clone(),
        }
    }

    /// Whether no key can fall inside the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(l), Bound::Included(u)) => l > u,
            (Bound::Included(l), Bound::Excluded(u))
            | (Bound::Excluded(l), Bound::Included(u))
            | (Bound::Excluded(l), Bound::Excluded(u)) => l >= u,
            _ => false,
        }
    }
}

/// Ascending cursor over one store.
pub struct Cursor<'a> {
    scope: &'a mut dyn Scope,
    store: String,
    range: KeyRange,
    current: Option<(Key, Record)>,
}

impl<'a> Cursor<'a> {
    /// Open a cursor positioned on the first record in `range`.
    pub fn open(scope: &'a mut dyn Scope, store: &str, range: KeyRange) -> Result<Self> {
        let current = seek(&*scope, store, &range)?;
        Ok(Self {
            scope,
            store: store.to_string(),
            range,
            current,
        })
    }

    /// Key of the current record, `None` once exhausted.
    pub fn key(&self) -> Option<&Key> {
        self.current.as_ref().map(|(k, _)| k)
    }

    /// The current record, `None` once exhausted.
    pub fn value(&self) -> Option<&Record> {
        self.current.as_ref().map(|(_, r)| r)
    }

    /// Move to the next record. Returns `false` once exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        let Some((key, _)) = self.current.take() else {
            return Ok(false);
        };
        let rest = self.range.after(&key);
        self.current = seek(&*self.scope, &self.store, &rest)?;
        Ok(self.current.is_some())
    }

    /// Delete the current record. The cursor stays on its position.
    pub fn delete(&mut self) -> Result<()> {
        if let Some((key, _)) = &self.current {
            self.scope.delete(&self.store, key)?;
        }
        Ok(())
    }
}

fn seek(scope: &dyn Scope, store: &str, range: &KeyRange) -> Result<Option<(Key, Record)>> {
    if range.is_empty() {
        return Ok(None);
    }
    scope.seek(store, &range.lower, &range.upper)
}
