//! SQLite implementation of the engine traits.
//!
//! This is the persistent engine. Each logical database lives in its own
//! SQLite file (or its own in-memory SQLite connection), and record
//! transactions run on `tokio::task::spawn_blocking`.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use stowage_core::{Key, Record};

use crate::cursor::KeyRange;
use crate::error::{EngineError, Result};
use crate::handles::{lock, HandleState, LiveHandles};
use crate::keygen::prepare_write;
use crate::migration;
use crate::traits::{Database, Engine, OpenHooks, SchemaScope, Scope, TxMode};

enum Location {
    Directory(PathBuf),
    Memory,
}

/// SQLite-based engine.
///
/// One SQLite connection per logical database, shared by every handle
/// opened on it and protected by a mutex.
pub struct SqliteEngine {
    location: Location,
    files: Mutex<HashMap<String, Arc<Mutex<Connection>>>>,
    handles: LiveHandles,
    open_lock: tokio::sync::Mutex<()>,
}

impl SqliteEngine {
    /// Store databases as files under `dir`, creating it if needed.
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(Self::with_location(Location::Directory(dir.as_ref().to_path_buf())))
    }

    /// Keep databases in in-memory SQLite connections.
    ///
    /// Useful for testing.
    pub fn in_memory() -> Self {
        Self::with_location(Location::Memory)
    }

    fn with_location(location: Location) -> Self {
        Self {
            location,
            files: Mutex::new(HashMap::new()),
            handles: LiveHandles::new(),
            open_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the file backing `name`, if the engine is file-based.
    pub fn path_for(&self, name: &str) -> Option<PathBuf> {
        match &self.location {
            Location::Directory(dir) => Some(dir.join(file_name(name))),
            Location::Memory => None,
        }
    }

    fn connection(&self, name: &str) -> Result<Arc<Mutex<Connection>>> {
        let mut files = lock(&self.files);
        if let Some(conn) = files.get(name) {
            return Ok(Arc::clone(conn));
        }

        let mut conn = match self.path_for(name) {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        migration::migrate(&mut conn)?;

        let conn = Arc::new(Mutex::new(conn));
        files.insert(name.to_string(), Arc::clone(&conn));
        Ok(conn)
    }
}

/// File name for a database name; bytes outside `[A-Za-z0-9_-]` are
/// percent-encoded so distinct names never share a file.
fn file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out.push_str(".sqlite3");
    out
}

fn read_version(conn: &Connection) -> Result<u64> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT value FROM database_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version.unwrap_or(0) as u64)
}

fn load_stores(conn: &Connection) -> Result<BTreeMap<String, String>> {
    let mut stmt = conn.prepare("SELECT name, key_path FROM object_stores ORDER BY name")?;
    let stores = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
    Ok(stores)
}

// Keys are spread over three columns so SQLite orders them like `Key`.
fn key_columns(key: &Key) -> (i64, i64, String) {
    match key {
        Key::Number(n) => (0, *n, String::new()),
        Key::Text(s) => (1, 0, s.clone()),
    }
}

fn key_from_columns(kind: i64, num: i64, text: String) -> Key {
    if kind == 0 {
        Key::Number(num)
    } else {
        Key::Text(text)
    }
}

fn encode_record(record: &Record) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_record(bytes: &[u8]) -> Result<Record> {
    ciborium::from_reader(bytes).map_err(|e| EngineError::Serialization(e.to_string()))
}

fn push_bound(sql: &mut String, params: &mut Vec<SqlValue>, bound: &Bound<Key>, inclusive: &str, exclusive: &str) {
    let (op, key) = match bound {
        Bound::Included(key) => (inclusive, key),
        Bound::Excluded(key) => (exclusive, key),
        Bound::Unbounded => return,
    };
    let (kind, num, text) = key_columns(key);
    let _ = write!(sql, " AND (key_kind, key_num, key_text) {} (?, ?, ?)", op);
    params.push(SqlValue::Integer(kind));
    params.push(SqlValue::Integer(num));
    params.push(SqlValue::Text(text));
}

#[async_trait]
impl Engine for SqliteEngine {
    type Database = SqliteDatabase;

    fn is_available(&self) -> bool {
        match &self.location {
            Location::Directory(dir) => dir.is_dir(),
            Location::Memory => true,
        }
    }

    async fn open(
        &self,
        name: &str,
        version: u64,
        hooks: &mut dyn OpenHooks,
    ) -> Result<SqliteDatabase> {
        if version == 0 {
            return Err(EngineError::InvalidVersion(version));
        }
        let _guard = self.open_lock.lock().await;
        let conn = self.connection(name)?;

        let (stored, existing) = {
            let conn = lock(&conn);
            let stores = load_stores(&conn)?;
            (read_version(&conn)?, stores.into_keys().collect::<Vec<_>>())
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

            let mut conn = lock(&conn);
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            hooks.upgrade_needed(&mut SqliteSchemaScope { conn: &tx }, stored, version)?;
            tx.execute(
                "INSERT INTO database_meta (key, value) VALUES ('version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![version as i64],
            )?;
            tx.commit()?;
            tracing::debug!(database = name, old_version = stored, new_version = version, "sqlite upgrade committed");
        }

        let stores = load_stores(&lock(&conn))?;

        Ok(SqliteDatabase {
            name: name.to_string(),
            version,
            stores,
            conn,
            handle: self
                .handles
                .register(name, version, hooks.version_change_listener()),
        })
    }
}

struct SqliteSchemaScope<'a> {
    conn: &'a Connection,
}

impl SchemaScope for SqliteSchemaScope<'_> {
    fn store_names(&self) -> Result<Vec<String>> {
        Ok(load_stores(self.conn)?.into_keys().collect())
    }

    fn create_store(&mut self, name: &str, key_path: &str) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM object_stores WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        if exists {
            return Err(EngineError::StoreExists(name.to_string()));
        }

        self.conn.execute(
            "INSERT INTO object_stores (name, key_path, next_key, created_at) VALUES (?1, ?2, 1, ?3)",
            params![name, key_path, now_millis()],
        )?;
        Ok(())
    }
}

/// Handle to a database opened by [`SqliteEngine`].
pub struct SqliteDatabase {
    name: String,
    version: u64,
    /// Store name -> key path, as of open.
    stores: BTreeMap<String, String>,
    conn: Arc<Mutex<Connection>>,
    handle: Arc<HandleState>,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        self.handle.close();
    }
}

#[async_trait]
impl Database for SqliteDatabase {
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
        let mut key_paths = HashMap::new();
        for store in stores {
            let key_path = self
                .stores
                .get(*store)
                .ok_or_else(|| EngineError::UnknownStore(store.to_string()))?;
            key_paths.insert(store.to_string(), key_path.clone());
        }

        let conn = Arc::clone(&self.conn);
        let handle = Arc::clone(&self.handle);

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn);
            // The handle may have been evicted while this task was queued.
            handle.ensure_open()?;

            let behavior = match mode {
                TxMode::ReadOnly => TransactionBehavior::Deferred,
                TxMode::ReadWrite => TransactionBehavior::Immediate,
            };
            let tx = conn.transaction_with_behavior(behavior)?;
            let output = {
                let mut scope = SqliteScope {
                    conn: &tx,
                    key_paths: &key_paths,
                    mode,
                };
                work(&mut scope as &mut dyn Scope)?
            };
            tx.commit()?;
            Ok(output)
        })
        .await
        .map_err(|e| EngineError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

struct SqliteScope<'a> {
    conn: &'a Connection,
    key_paths: &'a HashMap<String, String>,
    mode: TxMode,
}

impl SqliteScope<'_> {
    fn writable(&self, store: &str) -> Result<()> {
        if self.mode == TxMode::ReadOnly {
            return Err(EngineError::ReadOnly(store.to_string()));
        }
        Ok(())
    }

    fn exists(&self, store: &str, key: &Key) -> Result<bool> {
        let (kind, num, text) = key_columns(key);
        let exists = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records
             WHERE store = ?1 AND key_kind = ?2 AND key_num = ?3 AND key_text = ?4)",
            params![store, kind, num, text],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn write(&mut self, store: &str, record: Record, overwrite: bool) -> Result<(Key, Record)> {
        self.writable(store)?;
        let key_path = self.key_path(store)?;
        let next_key: i64 = self.conn.query_row(
            "SELECT next_key FROM object_stores WHERE name = ?1",
            params![store],
            |row| row.get(0),
        )?;

        let prepared = prepare_write(store, &key_path, next_key, record)?;
        if !overwrite && self.exists(store, &prepared.key)? {
            return Err(EngineError::Constraint {
                store: store.to_string(),
                key: prepared.key,
            });
        }

        let (kind, num, text) = key_columns(&prepared.key);
        let value = encode_record(&prepared.record)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO records (store, key_kind, key_num, key_text, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![store, kind, num, text, value],
        )?;
        if prepared.next_key != next_key {
            self.conn.execute(
                "UPDATE object_stores SET next_key = ?1 WHERE name = ?2",
                params![prepared.next_key, store],
            )?;
        }

        Ok((prepared.key, prepared.record))
    }
}

impl Scope for SqliteScope<'_> {
    fn key_path(&self, store: &str) -> Result<String> {
        self.key_paths
            .get(store)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStore(store.to_string()))
    }

    fn get(&self, store: &str, key: &Key) -> Result<Option<Record>> {
        self.key_path(store)?;
        let (kind, num, text) = key_columns(key);
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT value FROM records
                 WHERE store = ?1 AND key_kind = ?2 AND key_num = ?3 AND key_text = ?4",
                params![store, kind, num, text],
                |row| row.get(0),
            )
            .optional()?;
        bytes.as_deref().map(decode_record).transpose()
    }

    fn add(&mut self, store: &str, record: Record) -> Result<(Key, Record)> {
        self.write(store, record, false)
    }

    fn put(&mut self, store: &str, record: Record) -> Result<(Key, Record)> {
        self.write(store, record, true)
    }

    fn delete(&mut self, store: &str, key: &Key) -> Result<()> {
        self.writable(store)?;
        self.key_path(store)?;
        let (kind, num, text) = key_columns(key);
        self.conn.execute(
            "DELETE FROM records
             WHERE store = ?1 AND key_kind = ?2 AND key_num = ?3 AND key_text = ?4",
            params![store, kind, num, text],
        )?;
        Ok(())
    }

    fn seek(
        &self,
        store: &str,
        lower: &Bound<Key>,
        upper: &Bound<Key>,
    ) -> Result<Option<(Key, Record)>> {
        self.key_path(store)?;
        let range = KeyRange {
            lower: lower.clone(),
            upper: upper.clone(),
        };
        if range.is_empty() {
            return Ok(None);
        }

        let mut sql = String::from("SELECT key_kind, key_num, key_text, value FROM records WHERE store = ?");
        let mut values = vec![SqlValue::Text(store.to_string())];
        push_bound(&mut sql, &mut values, &range.lower, ">=", ">");
        push_bound(&mut sql, &mut values, &range.upper, "<=", "<");
        sql.push_str(" ORDER BY key_kind, key_num, key_text LIMIT 1");

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let row: Option<(i64, i64, String, Vec<u8>)> = stmt
            .query_row(params_from_iter(values), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .optional()?;

        match row {
            Some((kind, num, text, bytes)) => {
                Ok(Some((key_from_columns(kind, num, text), decode_record(&bytes)?)))
            }
            None => Ok(None),
        }
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
