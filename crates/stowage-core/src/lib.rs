//! # Stowage Core
//!
//! Pure data model for Stowage: keys, records, store definitions and schema
//! normalization.
//!
//! This crate contains no I/O and no engine. It decides *what* a schema is
//! and which stores must be created; the engine crate decides how.
//!
//! ## Key Types
//!
//! - [`Key`] - Primary key (number or text), totally ordered
//! - [`Record`] - A JSON object stored in an object store
//! - [`StoreDefinition`] - Declarative description of one object store
//! - [`SchemaConfig`] - Named, versioned list of store definitions
//!
//! ## Normalization
//!
//! [`normalize`] forces raw configuration through a structural copy, then
//! validates it. See [`schema`] and [`validation`].

pub mod error;
pub mod schema;
pub mod types;
pub mod validation;

pub use error::SchemaError;
pub use schema::{normalize, stores_needing_creation, SchemaConfig, StoreDefinition};
pub use types::{is_truthy, Key, Record};
pub use validation::{validate_config, validate_definitions};
