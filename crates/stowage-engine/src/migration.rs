//! File layout migrations for the SQLite engine.
//!
//! These version the engine's own tables, not the caller's schema. Each
//! migration transforms the layout from version N to N+1.

use rusqlite::Connection;

use crate::error::{EngineError, Result};

/// Current layout version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the file layout.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(EngineError::Migration(format!(
            "file layout version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "sqlite layout migrated");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(EngineError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: object stores and records.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Logical database metadata (the caller's schema version)
        CREATE TABLE database_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        -- One row per object store
        CREATE TABLE object_stores (
            name TEXT PRIMARY KEY,
            key_path TEXT NOT NULL,
            next_key INTEGER NOT NULL DEFAULT 1,  -- auto-increment generator
            created_at INTEGER NOT NULL
        );

        -- Records of every store, ordered by (key_kind, key_num, key_text)
        CREATE TABLE records (
            store TEXT NOT NULL REFERENCES object_stores(name),
            key_kind INTEGER NOT NULL,            -- 0=number, 1=text
            key_num INTEGER NOT NULL DEFAULT 0,
            key_text TEXT NOT NULL DEFAULT '',
            value BLOB NOT NULL,                  -- CBOR-encoded record
            PRIMARY KEY (store, key_kind, key_num, key_text)
        ) WITHOUT ROWID;
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
