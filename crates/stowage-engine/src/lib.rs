//! # Stowage Engine
//!
//! Transactional object-store engine behind the stowage connection layer.
//! Provides a trait-based contract with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! An [`Engine`] opens named databases at a version. Opening at a newer
//! version notifies older handles, waits for them to close, and runs the
//! caller's [`OpenHooks::upgrade_needed`] atomically. Records are read and
//! written through a [`Scope`] inside [`Database::transaction`], and
//! scanned in key order with a [`Cursor`].
//!
//! ## Key Types
//!
//! - [`Engine`] / [`Database`] - The async traits every engine implements
//! - [`SqliteEngine`] - SQLite-based persistent engine
//! - [`MemoryEngine`] - In-memory engine for tests
//! - [`Cursor`] / [`KeyRange`] - Ascending scans
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stowage_engine::{Database, Engine, OpenHooks, SchemaScope, SqliteEngine, TxMode};
//!
//! struct Items;
//!
//! impl OpenHooks for Items {
//!     fn upgrade_needed(
//!         &mut self,
//!         scope: &mut dyn SchemaScope,
//!         _old: u64,
//!         _new: u64,
//!     ) -> stowage_engine::Result<()> {
//!         scope.create_store("items", "id")
//!     }
//! }
//!
//! async fn example() {
//!     let engine = SqliteEngine::open_dir("data").unwrap();
//!     let db = engine.open("app", 1, &mut Items).await.unwrap();
//!
//!     let (key, _) = db
//!         .transaction(&["items"], TxMode::ReadWrite, |scope| {
//!             scope.add("items", serde_json::Map::new())
//!         })
//!         .await
//!         .unwrap();
//!     println!("stored under {key}");
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Auto-increment keys**: generators start at 1 and never reuse keys
//! - **Atomic scopes**: a transaction commits only when its closure succeeds
//! - **Stable cursors**: deleting the current record never skips the next

pub mod cursor;
pub mod error;
mod handles;
mod keygen;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use cursor::{Cursor, KeyRange};
pub use error::{EngineError, Result};
pub use handles::CloseHandle;
pub use memory::{MemoryDatabase, MemoryEngine};
pub use sqlite::{SqliteDatabase, SqliteEngine};
pub use traits::{
    BlockedAction, Database, Engine, OpenHooks, SchemaScope, Scope, TxMode, VersionChange,
    VersionChangeListener,
};
