//! Error types for Stowage Core.

use thiserror::Error;

/// Errors raised while parsing or validating a schema configuration.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The configuration could not round-trip through a structural copy.
    #[error("malformed {what} configuration: {reason}")]
    Parse { what: &'static str, reason: String },

    #[error("schema name must not be empty")]
    EmptyName,

    #[error("schema version must be a positive integer, got {0}")]
    InvalidVersion(u64),

    #[error("store name must not be empty (store #{0})")]
    EmptyStoreName(usize),

    #[error("store {0} is defined more than once")]
    DuplicateStore(String),

    #[error("store {0} has an empty key path")]
    EmptyKeyPath(String),

    #[error("default store {0} is not one of the configured stores")]
    UnknownDefaultStore(String),
}

impl SchemaError {
    pub(crate) fn parse(what: &'static str, err: impl std::fmt::Display) -> Self {
        SchemaError::Parse {
            what,
            reason: err.to_string(),
        }
    }
}

/// Result type for schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;
