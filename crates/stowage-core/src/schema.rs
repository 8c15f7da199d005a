//! Declarative schema: store definitions and their normalization.
//!
//! A schema is data only. [`normalize`] forces arbitrary serializable input
//! through a structural copy so that nothing but plain JSON-shaped data
//! reaches the engine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::types::Record;
use crate::validation::{validate_config, validate_definitions};

/// Declarative description of one object store.
///
/// Stores are always auto-increment and immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDefinition {
    /// Unique name within the schema.
    pub store_name: String,
    /// Field holding the primary key.
    #[serde(alias = "key")]
    pub key_path: String,
    /// Records inserted when the store is first created, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_data: Vec<Record>,
}

impl StoreDefinition {
    /// Create a definition without seed data.
    pub fn new(store_name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            key_path: key_path.into(),
            initial_data: Vec::new(),
        }
    }

    /// Attach seed records.
    pub fn with_initial_data(mut self, initial_data: Vec<Record>) -> Self {
        self.initial_data = initial_data;
        self
    }
}

/// The versioned schema a connection is opened against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConfig {
    /// Database name.
    pub name: String,
    /// Schema version; must never decrease across opens.
    pub version: u64,
    /// Store definitions in configuration order.
    #[serde(alias = "storeConfig")]
    pub stores: Vec<StoreDefinition>,
    /// Optional store the caller treats as the default target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_store: Option<String>,
}

impl SchemaConfig {
    /// Create an empty configuration.
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
            stores: Vec::new(),
            default_store: None,
        }
    }

    /// Append a store definition.
    pub fn store(mut self, definition: StoreDefinition) -> Self {
        self.stores.push(definition);
        self
    }

    /// Name the default store.
    pub fn default_store(mut self, store_name: impl Into<String>) -> Self {
        self.default_store = Some(store_name.into());
        self
    }

    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| SchemaError::parse("schema", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from an already decoded JSON value.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let config: Self =
            serde_json::from_value(value).map_err(|e| SchemaError::parse("schema", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every rule a configuration must satisfy before open.
    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }

    /// Look up a store definition by name.
    pub fn definition(&self, store_name: &str) -> Option<&StoreDefinition> {
        self.stores.iter().find(|d| d.store_name == store_name)
    }
}

/// Normalize raw store configuration into validated definitions.
///
/// The input is serialized to a JSON value and decoded back, which strips
/// anything that is not plain data. Fails with [`SchemaError::Parse`] when
/// that round trip is impossible.
pub fn normalize<T: Serialize + ?Sized>(raw: &T) -> Result<Vec<StoreDefinition>> {
    let value = serde_json::to_value(raw).map_err(|e| SchemaError::parse("store", e))?;
    let definitions: Vec<StoreDefinition> =
        serde_json::from_value(value).map_err(|e| SchemaError::parse("store", e))?;
    validate_definitions(&definitions)?;
    Ok(definitions)
}

/// Definitions whose store does not exist yet, in configuration order.
///
/// Additive only: existing stores are never altered or dropped.
pub fn stores_needing_creation<'a, S: AsRef<str>>(
    existing: &[S],
    definitions: &'a [StoreDefinition],
) -> Vec<&'a StoreDefinition> {
    definitions
        .iter()
        .filter(|d| !existing.iter().any(|name| name.as_ref() == d.store_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_normalize_json_value() {
        let raw = json!([
            { "storeName": "items", "keyPath": "id", "initialData": [{ "id": 1 }] },
            { "storeName": "tags", "key": "tag" }
        ]);
        let defs = normalize(&raw).unwrap();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].initial_data.len(), 1);
        assert_eq!(defs[1].key_path, "tag");
        assert!(defs[1].initial_data.is_empty());
    }

    #[test]
    fn test_normalize_rejects_wrong_shape() {
        let err = normalize(&json!({ "storeName": "items" })).unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));

        let err = normalize(&json!([{ "storeName": "items", "keyPath": "id", "initialData": [3] }]))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }

    #[test]
    fn test_normalize_rejects_unserializable() {
        // Non-string map keys cannot become a JSON object.
        let mut raw: HashMap<(u8, u8), u8> = HashMap::new();
        raw.insert((1, 2), 3);
        assert!(matches!(normalize(&raw), Err(SchemaError::Parse { .. })));
    }

    #[test]
    fn test_normalize_rejects_duplicates() {
        let raw = vec![StoreDefinition::new("a", "id"), StoreDefinition::new("a", "id")];
        assert!(matches!(normalize(&raw), Err(SchemaError::DuplicateStore(name)) if name == "a"));
    }

    #[test]
    fn test_stores_needing_creation_is_additive() {
        let defs = vec![
            StoreDefinition::new("a", "id"),
            StoreDefinition::new("b", "id"),
            StoreDefinition::new("c", "id"),
        ];
        let missing = stores_needing_creation(&["b", "z"], &defs);
        let names: Vec<_> = missing.iter().map(|d| d.store_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_config_from_json_aliases() {
        let config = SchemaConfig::from_json_str(
            r#"{
                "name": "T",
                "version": 2,
                "storeConfig": [{ "storeName": "items", "key": "id" }],
                "defaultStore": "items"
            }"#,
        )
        .unwrap();
        assert_eq!(config.version, 2);
        assert_eq!(config.stores[0].key_path, "id");
        assert_eq!(config.default_store.as_deref(), Some("items"));
        assert!(config.definition("items").is_some());
    }

    #[test]
    fn test_config_builder_roundtrip_through_json() {
        let config = SchemaConfig::new("T", 1)
            .store(StoreDefinition::new("items", "id"))
            .default_store("items");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(SchemaConfig::from_json_value(value).unwrap(), config);
    }
}
