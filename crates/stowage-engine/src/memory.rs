//! In-memory implementation of the engine traits.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence. Transactions work
//! on a copy of the database that replaces the original only on commit.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stowage_core::{Key, Record};

use crate::cursor::KeyRange;
use crate::error::{EngineError, Result};
use crate::handles::{lock, HandleState, LiveHandles};
use crate::keygen::prepare_write;
use crate::traits::{Database, Engine, OpenHooks, SchemaScope, Scope, TxMode};

/// In-memory engine.
///
/// All data is lost when the engine is dropped. Databases are shared by
/// every handle the engine opens, so several connections can coexist.
pub struct MemoryEngine {
    databases: Mutex<HashMap<String, Arc<Mutex<MemoryDb>>>>,
    handles: LiveHandles,
    open_lock: tokio::sync::Mutex<()>,
}

#[derive(Clone, Default)]
struct MemoryDb {
    /// Stored version; 0 until the first upgrade commits.
    version: u64,
    stores: BTreeMap<String, ObjectStore>,
}

#[derive(Clone)]
struct ObjectStore {
    key_path: String,
    next_key: i64,
    records: BTreeMap<Key, Record>,
}

impl MemoryEngine {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self {
            databases: Mutex::new(HashMap::new()),
            handles: LiveHandles::new(),
            open_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn database(&self, name: &str) -> Arc<Mutex<MemoryDb>> {
        Arc::clone(lock(&self.databases).entry(name.to_string()).or_default())
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    type Database = MemoryDatabase;

    async fn open(
        &self,
        name: &str,
        version: u64,
        hooks: &mut dyn OpenHooks,
    ) -> Result<MemoryDatabase> {
        if version == 0 {
            return Err(EngineError::InvalidVersion(version));
        }
        let _guard = self.open_lock.lock().await;
        let data = self.database(name);

        let (stored, existing) = {
            let db = lock(&data);
            (db.version, db.stores.keys().cloned().collect::<Vec<_>>())
        };
        if version < stored {
            return Err(EngineError::VersionError {
                requested: version,
                stored,
            });
        }

        if version > stored || hooks.wants_upgrade(&existing) {
            if version > stored {
                self.handles.evict(name, version, hooks).await?;
            }

            let mut db = lock(&data);
            let mut working = db.clone();
            hooks.upgrade_needed(&mut MemorySchemaScope { db: &mut working }, stored, version)?;
            working.version = version;
            *db = working;
            tracing::debug!(database = name, old_version = stored, new_version = version, "memory upgrade committed");
        }

        let stores = lock(&data)
            .stores
            .iter()
            .map(|(name, store)| (name.clone(), store.key_path.clone()))
            .collect();

        Ok(MemoryDatabase {
            name: name.to_string(),
            version,
            stores,
            data,
            handle: self
                .handles
                .register(name, version, hooks.version_change_listener()),
        })
    }
}

struct MemorySchemaScope<'a> {
    db: &'a mut MemoryDb,
}

impl SchemaScope for MemorySchemaScope<'_> {
    fn store_names(&self) -> Result<Vec<String>> {
        Ok(self.db.stores.keys().cloned().collect())
    }

    fn create_store(&mut self, name: &str, key_path: &str) -> Result<()> {
        if self.db.stores.contains_key(name) {
            return Err(EngineError::StoreExists(name.to_string()));
        }
        self.db.stores.insert(
            name.to_string(),
            ObjectStore {
                key_path: key_path.to_string(),
                next_key: 1,
                records: BTreeMap::new(),
            },
        );
        Ok(())
    }
}

/// Handle to a database opened by [`MemoryEngine`].
pub struct MemoryDatabase {
    name: String,
    version: u64,
    /// Store name -> key path, as of open.
    stores: BTreeMap<String, String>,
    data: Arc<Mutex<MemoryDb>>,
    handle: Arc<HandleState>,
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        self.handle.close();
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn key_path(&self, store: &str) -> Option<String> {
        self.stores.get(store).cloned()
    }

    fn close(&self) {
        self.handle.close();
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn transaction<F, T>(&self, stores: &[&str], mode: TxMode, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Scope) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.handle.ensure_open()?;
        if let Some(missing) = stores.iter().find(|s| !self.stores.contains_key(**s)) {
            return Err(EngineError::UnknownStore(missing.to_string()));
        }

        let mut db = lock(&self.data);
        let mut working = db.clone();
        let scope_stores: Vec<String> = stores.iter().map(|s| s.to_string()).collect();

        let mut scope = MemoryScope {
            db: &mut working,
            stores: &scope_stores,
            mode,
        };
        let output = work(&mut scope as &mut dyn Scope)?;

        if mode == TxMode::ReadWrite {
            *db = working;
        }
        Ok(output)
    }
}

struct MemoryScope<'a> {
    db: &'a mut MemoryDb,
    stores: &'a [String],
    mode: TxMode,
}

impl MemoryScope<'_> {
    fn store(&self, name: &str) -> Result<&ObjectStore> {
        if !self.stores.iter().any(|s| s == name) {
            return Err(EngineError::UnknownStore(name.to_string()));
        }
        self.db
            .stores
            .get(name)
            .ok_or_else(|| EngineError::UnknownStore(name.to_string()))
    }

    fn store_mut(&mut self, name: &str) -> Result<&mut ObjectStore> {
        if self.mode == TxMode::ReadOnly {
            return Err(EngineError::ReadOnly(name.to_string()));
        }
        if !self.stores.iter().any(|s| s == name) {
            return Err(EngineError::UnknownStore(name.to_string()));
        }
        self.db
            .stores
            .get_mut(name)
            .ok_or_else(|| EngineError::UnknownStore(name.to_string()))
    }

    fn write(&mut self, name: &str, record: Record, overwrite: bool) -> Result<(Key, Record)> {
        let store = self.store_mut(name)?;
        let prepared = prepare_write(name, &store.key_path, store.next_key, record)?;

        if !overwrite && store.records.contains_key(&prepared.key) {
            return Err(EngineError::Constraint {
                store: name.to_string(),
                key: prepared.key,
            });
        }

        store.next_key = prepared.next_key;
        store
            .records
            .insert(prepared.key.clone(), prepared.record.clone());
        Ok((prepared.key, prepared.record))
    }
}

impl Scope for MemoryScope<'_> {
    fn key_path(&self, store: &str) -> Result<String> {
        Ok(self.store(store)?.key_path.clone())
    }

    fn get(&self, store: &str, key: &Key) -> Result<Option<Record>> {
        Ok(self.store(store)?.records.get(key).cloned())
    }

    fn add(&mut self, store: &str, record: Record) -> Result<(Key, Record)> {
        self.write(store, record, false)
    }

    fn put(&mut self, store: &str, record: Record) -> Result<(Key, Record)> {
        self.write(store, record, true)
    }

    fn delete(&mut self, store: &str, key: &Key) -> Result<()> {
        self.store_mut(store)?.records.remove(key);
        Ok(())
    }

    fn seek(
        &self,
        store: &str,
        lower: &Bound<Key>,
        upper: &Bound<Key>,
    ) -> Result<Option<(Key, Record)>> {
        let store = self.store(store)?;
        let range = KeyRange {
            lower: lower.clone(),
            upper: upper.clone(),
        };
        if range.is_empty() {
            return Ok(None);
        }
        Ok(store
            .records
            .range((range.lower, range.upper))
            .next()
            .map(|(k, r)| (k.clone(), r.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use serde_json::json;

    struct CreateStores(Vec<(&'static str, &'static str)>);

    impl OpenHooks for CreateStores {
        fn wants_upgrade(&self, existing: &[String]) -> bool {
            self.0.iter().any(|(name, _)| !existing.iter().any(|e| e == name))
        }

        fn upgrade_needed(&mut self, scope: &mut dyn SchemaScope, _: u64, _: u64) -> Result<()> {
            for (name, key_path) in &self.0 {
                if !scope.store_names()?.iter().any(|s| s == name) {
                    scope.create_store(name, key_path)?;
                }
            }
            Ok(())
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn open_items(engine: &MemoryEngine) -> MemoryDatabase {
        let mut hooks = CreateStores(vec![("items", "id")]);
        engine.open("test", 1, &mut hooks).await.unwrap()
    }

    #[tokio::test]
    async fn test_memory_add_and_get() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let (key, stored) = db
            .transaction(&["items"], TxMode::ReadWrite, |scope| {
                scope.add("items", record(json!({ "title": "a" })))
            })
            .await
            .unwrap();
        assert_eq!(key, Key::Number(1));
        assert_eq!(stored["id"], json!(1));

        let fetched = db
            .transaction(&["items"], TxMode::ReadOnly, move |scope| scope.get("items", &key))
            .await
            .unwrap();
        assert_eq!(fetched, Some(stored));
    }

    #[tokio::test]
    async fn test_memory_constraint_rolls_back() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let err = db
            .transaction(&["items"], TxMode::ReadWrite, |scope| {
                scope.add("items", record(json!({ "id": 1 })))?;
                scope.add("items", record(json!({ "id": 1 })))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint { .. }));

        let first = db
            .transaction(&["items"], TxMode::ReadOnly, |scope| scope.get("items", &Key::from(1)))
            .await
            .unwrap();
        assert!(first.is_none());
    }

    #[tokio::test]
    async fn test_memory_read_only_rejects_writes() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let err = db
            .transaction(&["items"], TxMode::ReadOnly, |scope| {
                scope.add("items", record(json!({})))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn test_memory_keys_not_reused() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let key = db
            .transaction(&["items"], TxMode::ReadWrite, |scope| {
                let (a, _) = scope.add("items", record(json!({})))?;
                let (b, _) = scope.add("items", record(json!({})))?;
                scope.delete("items", &a)?;
                scope.delete("items", &b)?;
                let (c, _) = scope.add("items", record(json!({})))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(key, Key::Number(3));
    }

    #[tokio::test]
    async fn test_memory_cursor_delete_does_not_skip() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let remaining = db
            .transaction(&["items"], TxMode::ReadWrite, |scope| {
                for _ in 0..5 {
                    scope.add("items", record(json!({})))?;
                }
                let mut cursor = Cursor::open(scope, "items", KeyRange::scan())?;
                while cursor.value().is_some() {
                    cursor.delete()?;
                    cursor.advance()?;
                }
                let cursor = Cursor::open(scope, "items", KeyRange::scan())?;
                Ok(cursor.key().cloned())
            })
            .await
            .unwrap();
        assert_eq!(remaining, None);
    }

    #[tokio::test]
    async fn test_memory_closed_handle_rejects_transactions() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;
        db.close();

        let err = db
            .transaction(&["items"], TxMode::ReadOnly, |scope| scope.get("items", &Key::from(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Closed));
    }

    #[tokio::test]
    async fn test_memory_version_rules() {
        let engine = MemoryEngine::new();
        let mut hooks = CreateStores(vec![]);

        assert!(matches!(
            engine.open("v", 0, &mut hooks).await,
            Err(EngineError::InvalidVersion(0))
        ));

        let db = engine.open("v", 3, &mut hooks).await.unwrap();
        db.close();

        assert!(matches!(
            engine.open("v", 2, &mut hooks).await,
            Err(EngineError::VersionError {
                requested: 2,
                stored: 3
            })
        ));
    }

    #[tokio::test]
    async fn test_memory_unknown_store() {
        let engine = MemoryEngine::new();
        let db = open_items(&engine).await;

        let err = db
            .transaction(&["nope"], TxMode::ReadOnly, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownStore(name) if name == "nope"));
    }
}
