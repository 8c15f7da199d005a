//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use serde_json::Value;
use stowage::engine::{Engine, MemoryDatabase, MemoryEngine};
use stowage::{Connection, Record, SchemaConfig, StoreDefinition};

/// Name of the scenario database.
pub const SCENARIO_DB: &str = "T";

/// Store used by the scenario schema.
pub const ITEMS: &str = "items";

/// Build a record from a JSON object literal.
///
/// Non-object values produce an empty record.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// The reference scenario: one `items` store keyed by `id`, seeded with a
/// pending and a finished item.
pub fn scenario_config() -> SchemaConfig {
    SchemaConfig::new(SCENARIO_DB, 1).store(
        StoreDefinition::new(ITEMS, "id").with_initial_data(vec![
            record(serde_json::json!({ "id": 1, "done": false })),
            record(serde_json::json!({ "id": 2, "done": true })),
        ]),
    )
}

/// A schema with one unseeded store per name, all keyed by `id`.
pub fn empty_stores_config(name: &str, version: u64, stores: &[&str]) -> SchemaConfig {
    stores.iter().fold(SchemaConfig::new(name, version), |config, store| {
        config.store(StoreDefinition::new(*store, "id"))
    })
}

/// Values of the `id` field, in order.
pub fn ids(records: &[Record]) -> Vec<Value> {
    records
        .iter()
        .map(|r| r.get("id").cloned().unwrap_or(Value::Null))
        .collect()
}

/// Open the scenario schema on any engine.
pub async fn open_scenario<E: Engine>(engine: &E) -> stowage::Result<Connection<E::Database>> {
    Connection::open(engine, &scenario_config()).await
}

/// A test fixture owning an in-memory engine.
pub struct TestFixture {
    pub engine: MemoryEngine,
}

impl TestFixture {
    /// Create a fixture with a fresh engine.
    pub fn new() -> Self {
        Self {
            engine: MemoryEngine::new(),
        }
    }

    /// Open `config` on the fixture's engine.
    pub async fn open(&self, config: &SchemaConfig) -> stowage::Result<Connection<MemoryDatabase>> {
        Connection::open(&self.engine, config).await
    }

    /// Open the scenario schema on the fixture's engine.
    pub async fn scenario(&self) -> stowage::Result<Connection<MemoryDatabase>> {
        open_scenario(&self.engine).await
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
