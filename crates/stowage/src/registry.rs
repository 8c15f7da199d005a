//! Per-store highest-key counters.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use stowage_core::Key;
use stowage_engine::{Cursor, Database, KeyRange, TxMode};

/// Tracks the highest key present in each store.
///
/// A counter of 0 means the store is empty. Counters are a cache: they are
/// rebuilt by [`recompute`](Self::recompute) and nudged forward by writes
/// made through the owning connection.
#[derive(Debug, Default)]
pub struct KeyCounterRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl KeyCounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, HashMap<String, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Highest key of `store`, `None` if the store is not tracked.
    pub fn length(&self, store: &str) -> Option<u64> {
        self.counters().get(store).copied()
    }

    /// Increment the counter of `store` and return the new value.
    ///
    /// The result predicts the key of the next generated record, but it is
    /// not coordinated with the engine's generator: a failed add, an explicit
    /// key or another connection all make the two drift apart.
    pub fn next_key(&self, store: &str) -> Option<u64> {
        let mut counters = self.counters();
        let counter = counters.get_mut(store)?;
        *counter = counter.saturating_add(1);
        Some(*counter)
    }

    /// Overwrite the counter of `store`.
    pub fn set(&self, store: &str, value: u64) {
        self.counters().insert(store.to_string(), value);
    }

    /// Raise the counter of a tracked store to `key` if it is higher.
    ///
    /// Text and non-positive keys never move the counter.
    pub fn observe(&self, store: &str, key: &Key) {
        let Some(n) = key.as_number().filter(|n| *n > 0) else {
            return;
        };
        if let Some(counter) = self.counters().get_mut(store) {
            *counter = (*counter).max(n as u64);
        }
    }

    /// Rebuild the counter of `store` with a full ascending scan.
    ///
    /// The counter becomes the key of the last visited record, or 0 when the
    /// store is empty. Keys are never reused, so this stays correct after
    /// deletions.
    pub async fn recompute<D: Database>(
        &self,
        db: &D,
        store: &str,
    ) -> stowage_engine::Result<u64> {
        let name = store.to_string();
        let last = db
            .transaction(&[store], TxMode::ReadOnly, move |scope| {
                let mut cursor = Cursor::open(scope, &name, KeyRange::scan())?;
                let mut last = 0;
                while let Some(key) = cursor.key() {
                    last = key.as_number().map_or(last, |n| n as u64);
                    cursor.advance()?;
                }
                Ok(last)
            })
            .await?;

        self.set(store, last);
        tracing::debug!(store, length = last, "key counter recomputed");
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stowage_engine::{Engine, MemoryEngine, OpenHooks, SchemaScope};

    struct Items;

    impl OpenHooks for Items {
        fn upgrade_needed(
            &mut self,
            scope: &mut dyn SchemaScope,
            _: u64,
            _: u64,
        ) -> stowage_engine::Result<()> {
            scope.create_store("items", "id")
        }
    }

    #[test]
    fn test_next_key_increments() {
        let registry = KeyCounterRegistry::new();
        assert_eq!(registry.next_key("items"), None);

        registry.set("items", 2);
        assert_eq!(registry.next_key("items"), Some(3));
        assert_eq!(registry.next_key("items"), Some(4));
        assert_eq!(registry.length("items"), Some(4));
    }

    #[test]
    fn test_observe_only_raises() {
        let registry = KeyCounterRegistry::new();
        registry.set("items", 5);

        registry.observe("items", &Key::from(3));
        assert_eq!(registry.length("items"), Some(5));
        registry.observe("items", &Key::from(9));
        assert_eq!(registry.length("items"), Some(9));
        registry.observe("items", &Key::from("z"));
        registry.observe("items", &Key::from(-1));
        assert_eq!(registry.length("items"), Some(9));

        registry.observe("unknown", &Key::from(1));
        assert_eq!(registry.length("unknown"), None);
    }

    #[tokio::test]
    async fn test_recompute_uses_last_scanned_key() {
        let engine = MemoryEngine::new();
        let db = engine.open("db", 1, &mut Items).await.unwrap();
        let registry = KeyCounterRegistry::new();

        assert_eq!(registry.recompute(&db, "items").await.unwrap(), 0);

        db.transaction(&["items"], TxMode::ReadWrite, |scope| {
            for record in [json!({}), json!({}), json!({ "id": "text" }), json!({ "id": 0 })] {
                scope.add("items", record.as_object().cloned().unwrap())?;
            }
            scope.delete("items", &Key::from(1))
        })
        .await
        .unwrap();

        assert_eq!(registry.recompute(&db, "items").await.unwrap(), 2);
        assert_eq!(registry.length("items"), Some(2));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn observe_tracks_running_max(start in 0u64..100, keys in proptest::collection::vec(-10i64..200, 0..30)) {
                let registry = KeyCounterRegistry::new();
                registry.set("items", start);

                let mut expected = start;
                for key in keys {
                    registry.observe("items", &Key::from(key));
                    if key > 0 {
                        expected = expected.max(key as u64);
                    }
                    prop_assert_eq!(registry.length("items"), Some(expected));
                }
            }
        }
    }
}
