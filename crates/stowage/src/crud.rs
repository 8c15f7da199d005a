//! Record operations on a ready connection.
//!
//! Each call runs in its own engine transaction. Scans walk numeric keys
//! from 1 upwards in ascending order; key 0, negative keys and text keys are
//! only reachable through [`Connection::get`] and [`Connection::remove`].

use stowage_core::{is_truthy, Key, Record};
use stowage_engine::{Cursor, Database, KeyRange, Scope, TxMode};

use crate::connection::Connection;
use crate::error::Result;

/// Records of `store` in scan order for which `keep` returns true.
fn collect_where(
    scope: &mut dyn Scope,
    store: &str,
    mut keep: impl FnMut(&Record) -> bool,
) -> stowage_engine::Result<Vec<Record>> {
    let mut cursor = Cursor::open(scope, store, KeyRange::scan())?;
    let mut records = Vec::new();
    while let Some(record) = cursor.value() {
        if keep(record) {
            records.push(record.clone());
        }
        cursor.advance()?;
    }
    Ok(records)
}

/// Delete, in place, every scanned record for which `matches` returns true.
fn delete_where(
    scope: &mut dyn Scope,
    store: &str,
    mut matches: impl FnMut(&Record) -> bool,
) -> stowage_engine::Result<usize> {
    let mut cursor = Cursor::open(scope, store, KeyRange::scan())?;
    let mut removed = 0;
    while let Some(record) = cursor.value() {
        if matches(record) {
            cursor.delete()?;
            removed += 1;
        }
        cursor.advance()?;
    }
    Ok(removed)
}

impl<D: Database> Connection<D> {
    /// Point lookup. A missing record is `Ok(None)`.
    pub async fn get(&self, store: &str, key: impl Into<Key>) -> Result<Option<Record>> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let key = key.into();
        let name = store.to_string();

        self.db
            .transaction(&[store], TxMode::ReadOnly, move |scope| scope.get(&name, &key))
            .await
            .map_err(|e| self.engine_error(e))
    }

    /// Every scanned record, ascending by key.
    pub async fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();

        self.db
            .transaction(&[store], TxMode::ReadOnly, move |scope| {
                collect_where(scope, &name, |_| true)
            })
            .await
            .map_err(|e| self.engine_error(e))
    }

    /// Scanned records whose `field` has the given truthiness.
    pub async fn get_where(&self, store: &str, field: &str, expected: bool) -> Result<Vec<Record>> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();
        let field = field.to_string();

        self.db
            .transaction(&[store], TxMode::ReadOnly, move |scope| {
                collect_where(scope, &name, |record| {
                    is_truthy(record.get(&field)) == expected
                })
            })
            .await
            .map_err(|e| self.engine_error(e))
    }

    /// Insert a record and return it with its key injected.
    ///
    /// The key is generated when the key field is absent. An explicit key
    /// that is already taken fails with `Constraint`.
    pub async fn add(&self, store: &str, record: Record) -> Result<Record> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();

        let (key, record) = self
            .db
            .transaction(&[store], TxMode::ReadWrite, move |scope| scope.add(&name, record))
            .await
            .map_err(|e| self.engine_error(e))?;

        self.registry.observe(store, &key);
        tracing::debug!(store, %key, "record added");
        Ok(record)
    }

    /// Insert or fully replace the record under its key.
    ///
    /// Fields of the previous record are not merged.
    pub async fn update(&self, store: &str, record: Record) -> Result<Record> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();

        let (key, record) = self
            .db
            .transaction(&[store], TxMode::ReadWrite, move |scope| scope.put(&name, record))
            .await
            .map_err(|e| self.engine_error(e))?;

        self.registry.observe(store, &key);
        tracing::debug!(store, %key, "record updated");
        Ok(record)
    }

    /// Delete by key. Deleting a missing key succeeds.
    pub async fn remove(&self, store: &str, key: impl Into<Key>) -> Result<()> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let key = key.into();
        let name = store.to_string();

        self.db
            .transaction(&[store], TxMode::ReadWrite, {
                let key = key.clone();
                move |scope| scope.delete(&name, &key)
            })
            .await
            .map_err(|e| self.engine_error(e))?;

        tracing::debug!(store, %key, "record removed");
        Ok(())
    }

    /// Delete every scanned record whose `field` has the given truthiness.
    ///
    /// Returns the number of deleted records.
    pub async fn remove_where(&self, store: &str, field: &str, expected: bool) -> Result<usize> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();
        let field = field.to_string();

        let removed = self
            .db
            .transaction(&[store], TxMode::ReadWrite, move |scope| {
                delete_where(scope, &name, |record| {
                    is_truthy(record.get(&field)) == expected
                })
            })
            .await
            .map_err(|e| self.engine_error(e))?;

        tracing::debug!(store, removed, "records removed by predicate");
        Ok(removed)
    }

    /// Delete every scanned record. Returns the number of deleted records.
    ///
    /// The key counter is left as is; call [`recompute`](Self::recompute)
    /// to reset it.
    pub async fn clear(&self, store: &str) -> Result<usize> {
        self.ensure_ready()?;
        self.key_path(store)?;
        let name = store.to_string();

        let removed = self
            .db
            .transaction(&[store], TxMode::ReadWrite, move |scope| {
                delete_where(scope, &name, |_| true)
            })
            .await
            .map_err(|e| self.engine_error(e))?;

        tracing::debug!(store, removed, "store cleared");
        Ok(removed)
    }
}
