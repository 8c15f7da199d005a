//! Schema validation: structural rules checked before any engine work.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::schema::{SchemaConfig, StoreDefinition};

/// Validate a list of store definitions.
///
/// This checks:
/// - Store names are non-empty
/// - Store names are unique
/// - Key paths are non-empty
pub fn validate_definitions(definitions: &[StoreDefinition]) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();

    for (index, definition) in definitions.iter().enumerate() {
        if definition.store_name.is_empty() {
            return Err(SchemaError::EmptyStoreName(index));
        }
        if !seen.insert(definition.store_name.as_str()) {
            return Err(SchemaError::DuplicateStore(definition.store_name.clone()));
        }
        if definition.key_path.is_empty() {
            return Err(SchemaError::EmptyKeyPath(definition.store_name.clone()));
        }
    }

    Ok(())
}

/// Validate a whole configuration.
///
/// On top of [`validate_definitions`]: the name is non-empty, the version is
/// at least 1 and the default store, when set, is configured.
pub fn validate_config(config: &SchemaConfig) -> Result<(), SchemaError> {
    if config.name.is_empty() {
        return Err(SchemaError::EmptyName);
    }
    if config.version == 0 {
        return Err(SchemaError::InvalidVersion(config.version));
    }

    validate_definitions(&config.stores)?;

    if let Some(default) = &config.default_store {
        if config.definition(default).is_none() {
            return Err(SchemaError::UnknownDefaultStore(default.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SchemaConfig {
        SchemaConfig::new("db", 1).store(StoreDefinition::new("items", "id"))
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&config()).is_ok());
    }

    #[test]
    fn test_zero_version_rejected() {
        let mut c = config();
        c.version = 0;
        assert!(matches!(validate_config(&c), Err(SchemaError::InvalidVersion(0))));
    }

    #[test]
    fn test_empty_names_rejected() {
        let c = SchemaConfig::new("", 1);
        assert!(matches!(validate_config(&c), Err(SchemaError::EmptyName)));

        let c = SchemaConfig::new("db", 1).store(StoreDefinition::new("", "id"));
        assert!(matches!(validate_config(&c), Err(SchemaError::EmptyStoreName(0))));

        let c = SchemaConfig::new("db", 1).store(StoreDefinition::new("items", ""));
        assert!(matches!(validate_config(&c), Err(SchemaError::EmptyKeyPath(_))));
    }

    #[test]
    fn test_unknown_default_store_rejected() {
        let c = config().default_store("other");
        assert!(matches!(
            validate_config(&c),
            Err(SchemaError::UnknownDefaultStore(name)) if name == "other"
        ));
    }
}
