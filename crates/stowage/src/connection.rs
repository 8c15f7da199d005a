//! Opening, guarding and closing connections.
//!
//! [`Connection::open`] runs the whole lifecycle: validate the schema, open
//! the engine (creating missing stores inside its version-change scope),
//! seed the stores it created, and recompute every key counter. The
//! connection is only handed out once all of that has finished, so every
//! operation on it starts from the `Ready` state.

use std::sync::Arc;

use stowage_core::{normalize, validate_config, SchemaConfig};
use stowage_engine::{Database, Engine, EngineError};

use crate::error::{Result, StowageError};
use crate::lifecycle::{ConnectionState, LifecycleObserver, LogObserver, OpenTracker, Status};
use crate::registry::KeyCounterRegistry;
use crate::seeder::{seed, SeedReport};

/// An open, ready connection to one versioned database.
///
/// Dropping the connection closes its engine handle.
pub struct Connection<D: Database> {
    pub(crate) db: D,
    pub(crate) status: Arc<Status>,
    pub(crate) registry: KeyCounterRegistry,
    default_store: Option<String>,
    seeded: Vec<SeedReport>,
}

impl<D: Database> Connection<D> {
    /// Open `config` on `engine`, logging lifecycle events.
    pub async fn open<E>(engine: &E, config: &SchemaConfig) -> Result<Self>
    where
        E: Engine<Database = D>,
    {
        Self::open_with(engine, config, Arc::new(LogObserver)).await
    }

    /// Open `config` on `engine`, reporting lifecycle events to `observer`.
    pub async fn open_with<E>(
        engine: &E,
        config: &SchemaConfig,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<Self>
    where
        E: Engine<Database = D>,
    {
        let definitions = normalize(&config.stores)?;
        validate_config(config)?;

        let name = config.name.as_str();
        let status = Arc::new(Status::new(name, observer));
        status.transition(ConnectionState::Opening);

        if !engine.is_available() {
            status.observer().unsupported(name);
            status.transition(ConnectionState::Error);
            return Err(StowageError::EnvironmentUnsupported);
        }

        let (db, created) = {
            let mut tracker = OpenTracker::new(&status, &definitions);
            match engine.open(name, config.version, &mut tracker).await {
                Ok(db) => (db, tracker.created().to_vec()),
                Err(err) => {
                    tracing::error!(database = name, version = config.version, error = %err, "open failed");
                    status.fail();
                    return Err(StowageError::open(name, err));
                }
            }
        };

        let mut connection = Self {
            db,
            status,
            registry: KeyCounterRegistry::new(),
            default_store: config.default_store.clone(),
            seeded: Vec::new(),
        };

        if let Err(err) = connection.finish_open(&definitions, &created).await {
            connection.db.close();
            if connection.status.is_evicted() {
                return Err(StowageError::StaleConnection(name.to_string()));
            }
            tracing::error!(database = name, version = config.version, error = %err, "open failed");
            connection.status.fail();
            return Err(StowageError::open(name, err));
        }

        // A newer version may have been requested while seeding.
        if !connection.status.ready() {
            return Err(StowageError::StaleConnection(name.to_string()));
        }
        tracing::info!(
            database = name,
            version = config.version,
            stores = definitions.len(),
            "connection ready"
        );
        Ok(connection)
    }

    /// Seed the stores created by this open, then rebuild every counter.
    async fn finish_open(
        &mut self,
        definitions: &[stowage_core::StoreDefinition],
        created: &[String],
    ) -> stowage_engine::Result<()> {
        for definition in definitions {
            if created.contains(&definition.store_name) && !definition.initial_data.is_empty() {
                let report = seed(&self.db, definition).await?;
                self.seeded.push(report);
            }
        }
        for definition in definitions {
            self.registry
                .recompute(&self.db, &definition.store_name)
                .await?;
        }
        Ok(())
    }

    /// Close the connection. Later operations fail with `Closed`.
    pub fn close(&self) {
        if self.db.is_closed() && self.state() == ConnectionState::Closed {
            return;
        }
        self.db.close();
        self.status.transition(ConnectionState::Closed);
        tracing::info!(database = self.db.name(), "connection closed");
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Database name.
    pub fn name(&self) -> &str {
        self.db.name()
    }

    /// Version the connection was opened at.
    pub fn version(&self) -> u64 {
        self.db.version()
    }

    /// Stores present in the database, sorted.
    pub fn store_names(&self) -> Vec<String> {
        self.db.store_names()
    }

    /// The configured default store, if any.
    pub fn default_store(&self) -> Option<&str> {
        self.default_store.as_deref()
    }

    /// Seeding outcomes of the stores created by this open.
    pub fn seeded(&self) -> &[SeedReport] {
        &self.seeded
    }

    /// Highest key of `store`, `None` if the store is not configured.
    pub fn length(&self, store: &str) -> Result<Option<u64>> {
        self.ensure_ready()?;
        Ok(self.registry.length(store))
    }

    /// Increment and return the counter of `store`.
    ///
    /// See [`KeyCounterRegistry::next_key`] for why this can drift from the
    /// keys the engine actually assigns.
    pub fn next_key(&self, store: &str) -> Result<u64> {
        self.ensure_ready()?;
        self.registry
            .next_key(store)
            .ok_or_else(|| StowageError::UnknownStore(store.to_string()))
    }

    /// Rebuild the counter of `store` with a full scan.
    pub async fn recompute(&self, store: &str) -> Result<u64> {
        self.ensure_ready()?;
        self.key_path(store)?;
        self.registry
            .recompute(&self.db, store)
            .await
            .map_err(|e| self.engine_error(e))
    }

    /// Fail fast unless the connection is ready.
    pub(crate) fn ensure_ready(&self) -> Result<()> {
        if self.status.is_evicted() {
            return Err(StowageError::StaleConnection(self.name().to_string()));
        }
        match self.state() {
            ConnectionState::Ready if !self.db.is_closed() => Ok(()),
            ConnectionState::Ready | ConnectionState::Closed => {
                Err(StowageError::Closed(self.name().to_string()))
            }
            state => Err(StowageError::NotReady {
                name: self.name().to_string(),
                state,
            }),
        }
    }

    pub(crate) fn key_path(&self, store: &str) -> Result<String> {
        self.db
            .key_path(store)
            .ok_or_else(|| StowageError::UnknownStore(store.to_string()))
    }

    /// Map an engine error raised after open.
    pub(crate) fn engine_error(&self, err: EngineError) -> StowageError {
        match err {
            EngineError::Closed if self.status.is_evicted() => {
                StowageError::StaleConnection(self.name().to_string())
            }
            EngineError::Closed => StowageError::Closed(self.name().to_string()),
            other => other.into(),
        }
    }
}

impl<D: Database> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("state", &self.state())
            .field("default_store", &self.default_store)
            .finish()
    }
}
