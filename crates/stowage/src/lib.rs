//! # Stowage
//!
//! Schema-versioned embedded object stores: declare named stores with
//! auto-increment keys and seed data, open them at a version, and read and
//! write records without hand-written transaction or cursor code.
//!
//! ## Overview
//!
//! A [`Connection`] is produced by [`Connection::open`], which:
//!
//! - **Validates** the [`SchemaConfig`] and normalizes its store definitions
//! - **Upgrades** the database when the version grew or a store is missing,
//!   evicting older connections first
//! - **Seeds** every store it created with its initial data
//! - **Recomputes** the highest key of every store, then returns the ready
//!   connection
//!
//! A connection evicted by a newer version fails every later call with
//! [`StowageError::StaleConnection`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//! use stowage::{Connection, SchemaConfig, StoreDefinition};
//! use stowage::engine::SqliteEngine;
//!
//! async fn example() {
//!     let engine = SqliteEngine::open_dir("data").unwrap();
//!     let config = SchemaConfig::new("todo", 1).store(StoreDefinition::new("items", "id"));
//!
//!     let conn = Connection::open(&engine, &config).await.unwrap();
//!
//!     let item = json!({ "title": "write docs", "done": false });
//!     let added = conn.add("items", item.as_object().cloned().unwrap()).await.unwrap();
//!     assert_eq!(added["id"], json!(1));
//!
//!     let open_items = conn.get_where("items", "done", false).await.unwrap();
//!     assert_eq!(open_items.len(), 1);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `stowage::core` - Data model and schema normalization
//! - `stowage::engine` - Engine contract, SQLite and in-memory engines

pub mod connection;
mod crud;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod seeder;

// Re-export component crates
pub use stowage_core as core;
pub use stowage_engine as engine;

// Re-export main types for convenience
pub use connection::Connection;
pub use error::{Result, StowageError};
pub use lifecycle::{ConnectionState, LifecycleObserver, LogObserver};
pub use registry::KeyCounterRegistry;
pub use seeder::SeedReport;

// Re-export commonly used core types
pub use stowage_core::{Key, Record, SchemaConfig, StoreDefinition};
pub use stowage_engine::BlockedAction;
