//! Error types for the engine module.

use stowage_core::Key;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record with this key already exists.
    #[error("constraint error: key {key} already exists in store {store}")]
    Constraint { store: String, key: Key },

    /// The object store does not exist or is outside the transaction scope.
    #[error("unknown object store: {0}")]
    UnknownStore(String),

    /// The object store already exists.
    #[error("object store {0} already exists")]
    StoreExists(String),

    /// The record's key field is not a valid key.
    #[error("invalid key in store {store}: {reason}")]
    InvalidKey { store: String, reason: String },

    /// A write was attempted in a read-only transaction.
    #[error("transaction on {0} is read-only")]
    ReadOnly(String),

    /// Version 0 was requested.
    #[error("invalid version {0}: versions start at 1")]
    InvalidVersion(u64),

    /// The requested version is lower than the stored one.
    #[error("requested version {requested} is lower than stored version {stored}")]
    VersionError { requested: u64, stored: u64 },

    /// The open was abandoned while older connections stayed open.
    #[error("open of version {new_version} blocked by connections at version {old_version}")]
    Blocked { old_version: u64, new_version: u64 },

    /// The handle was closed.
    #[error("database handle is closed")]
    Closed,

    /// Layout migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task failed to complete.
    #[error("engine task failed: {0}")]
    Task(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
