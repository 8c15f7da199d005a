//! Seeding of freshly created stores.

use stowage_core::{Key, StoreDefinition};
use stowage_engine::{Database, TxMode};

/// Outcome of seeding one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    /// The seeded store.
    pub store: String,
    /// Keys assigned to the seed records, in input order.
    pub keys: Vec<Key>,
}

/// Insert the definition's initial data in order, inside one write scope.
///
/// Uniqueness is left to the engine: a duplicate key aborts the scope and
/// nothing is committed.
pub async fn seed<D: Database>(
    db: &D,
    definition: &StoreDefinition,
) -> stowage_engine::Result<SeedReport> {
    let store = definition.store_name.clone();
    let records = definition.initial_data.clone();

    let keys = db
        .transaction(&[store.as_str()], TxMode::ReadWrite, {
            let store = store.clone();
            move |scope| {
                let mut keys = Vec::with_capacity(records.len());
                for (index, record) in records.into_iter().enumerate() {
                    let (key, _) = scope.add(&store, record)?;
                    tracing::debug!(store = %store, index, %key, "seed record added");
                    keys.push(key);
                }
                Ok(keys)
            }
        })
        .await?;

    tracing::info!(store = %store, count = keys.len(), "store seeded");
    Ok(SeedReport { store, keys })
}
