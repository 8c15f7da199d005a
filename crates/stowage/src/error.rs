//! Error types for connections.

use stowage_core::{Key, SchemaError};
use stowage_engine::EngineError;
use thiserror::Error;

use crate::lifecycle::ConnectionState;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum StowageError {
    /// The engine cannot run in this environment.
    #[error("storage engine is not available in this environment")]
    EnvironmentUnsupported,

    /// Malformed store or seed configuration.
    #[error("invalid schema: {0}")]
    SchemaParse(#[from] SchemaError),

    /// Older connections stayed open and the open was abandoned.
    #[error("open of {name} at version {new_version} blocked by connections at version {old_version}")]
    OpenBlocked {
        name: String,
        old_version: u64,
        new_version: u64,
    },

    /// Engine fault while opening, upgrading or seeding.
    #[error("failed to open {name}: {source}")]
    OpenError {
        name: String,
        #[source]
        source: EngineError,
    },

    /// An explicit key collided with an existing record.
    #[error("constraint error: key {key} already exists in store {store}")]
    Constraint { store: String, key: Key },

    /// The connection was evicted by a newer version.
    #[error("connection to {0} was closed by a version change")]
    StaleConnection(String),

    /// The connection was closed explicitly.
    #[error("connection to {0} is closed")]
    Closed(String),

    /// The connection has not reached the ready state.
    #[error("connection to {name} is not ready ({state:?})")]
    NotReady { name: String, state: ConnectionState },

    /// The store is not part of the opened schema.
    #[error("unknown object store: {0}")]
    UnknownStore(String),

    /// Any other engine error.
    #[error("engine error: {0}")]
    Engine(EngineError),
}

impl StowageError {
    /// Wrap an engine error raised during open.
    pub(crate) fn open(name: &str, err: EngineError) -> Self {
        match err {
            EngineError::Blocked {
                old_version,
                new_version,
            } => Self::OpenBlocked {
                name: name.to_string(),
                old_version,
                new_version,
            },
            source => Self::OpenError {
                name: name.to_string(),
                source,
            },
        }
    }
}

impl From<EngineError> for StowageError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Constraint { store, key } => Self::Constraint { store, key },
            EngineError::UnknownStore(store) => Self::UnknownStore(store),
            other => Self::Engine(other),
        }
    }
}

/// Result type for connection operations.
pub type Result<T> = std::result::Result<T, StowageError>;
