//! Connection lifecycle: states, observer callbacks and the open hooks.
//!
//! A connection moves `Closed -> Opening -> Upgrading? -> Ready` and ends in
//! `Closed` (explicit close or version-change eviction) or `Error`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use stowage_core::{stores_needing_creation, StoreDefinition};
use stowage_engine::{BlockedAction, OpenHooks, SchemaScope, VersionChange, VersionChangeListener};

/// State of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not open, or closed for good.
    Closed,
    /// Waiting for the engine to open the database.
    Opening,
    /// Creating stores inside the version-change scope, then seeding them.
    Upgrading,
    /// Open; CRUD operations are valid.
    Ready,
    /// The open failed.
    Error,
}

/// Operator notifications raised while a connection opens and lives.
///
/// Every method has a default that logs through `tracing`; implement only
/// the ones you need.
pub trait LifecycleObserver: Send + Sync {
    /// A connection changed state.
    fn state_changed(&self, name: &str, from: ConnectionState, to: ConnectionState) {
        tracing::debug!(database = name, ?from, ?to, "connection state changed");
    }

    /// Older connections did not close after being notified.
    ///
    /// Returning [`BlockedAction::Wait`] stalls the open until they close.
    fn blocked(&self, name: &str, old_version: u64, new_version: u64) -> BlockedAction {
        tracing::warn!(
            database = name,
            old_version,
            new_version,
            "close other connections to this database to let the upgrade proceed"
        );
        BlockedAction::Wait
    }

    /// This connection was evicted because another one is upgrading.
    fn version_change(&self, name: &str, old_version: u64, new_version: u64) {
        tracing::warn!(
            database = name,
            old_version,
            new_version,
            "a newer version is being installed; connection closed"
        );
    }

    /// The engine cannot run here.
    fn unsupported(&self, name: &str) {
        tracing::error!(database = name, "storage engine is not supported in this environment");
    }
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl LifecycleObserver for LogObserver {}

/// State shared between a connection and its version-change listener.
pub(crate) struct Status {
    name: String,
    state: Mutex<ConnectionState>,
    evicted: AtomicBool,
    observer: Arc<dyn LifecycleObserver>,
}

impl Status {
    pub(crate) fn new(name: &str, observer: Arc<dyn LifecycleObserver>) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(ConnectionState::Closed),
            evicted: AtomicBool::new(false),
            observer,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn transition(&self, to: ConnectionState) {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, to)
        };
        if from != to {
            self.observer.state_changed(&self.name, from, to);
        }
    }

    /// Move to `Ready` unless an eviction got there first.
    pub(crate) fn ready(&self) -> bool {
        let from = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_evicted() {
                return false;
            }
            std::mem::replace(&mut *state, ConnectionState::Ready)
        };
        if from != ConnectionState::Ready {
            self.observer
                .state_changed(&self.name, from, ConnectionState::Ready);
        }
        true
    }

    /// Mark the open as failed, unless an eviction already closed it.
    pub(crate) fn fail(&self) {
        if !self.is_evicted() {
            self.transition(ConnectionState::Error);
        }
    }

    pub(crate) fn evict(&self, old_version: u64, new_version: u64) {
        self.evicted.store(true, Ordering::SeqCst);
        self.observer.version_change(&self.name, old_version, new_version);
        self.transition(ConnectionState::Closed);
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub(crate) fn observer(&self) -> &dyn LifecycleObserver {
        self.observer.as_ref()
    }
}

/// Hooks handed to the engine during open.
///
/// Creates every configured store that is missing and remembers which ones
/// it created so they can be seeded afterwards. Also supplies the listener
/// that evicts the connection when a newer version is requested.
pub(crate) struct OpenTracker<'a> {
    status: &'a Arc<Status>,
    definitions: &'a [StoreDefinition],
    created: Vec<String>,
}

impl<'a> OpenTracker<'a> {
    pub(crate) fn new(status: &'a Arc<Status>, definitions: &'a [StoreDefinition]) -> Self {
        Self {
            status,
            definitions,
            created: Vec::new(),
        }
    }

    /// Stores created by the upgrade, in configuration order.
    pub(crate) fn created(&self) -> &[String] {
        &self.created
    }
}

impl OpenHooks for OpenTracker<'_> {
    fn wants_upgrade(&self, existing: &[String]) -> bool {
        !stores_needing_creation(existing, self.definitions).is_empty()
    }

    fn version_change_listener(&mut self) -> Option<VersionChangeListener> {
        let status = Arc::clone(self.status);
        Some(Box::new(move |change: &VersionChange| {
            change.close();
            status.evict(change.old_version, change.new_version);
        }))
    }

    fn blocked(&mut self, old_version: u64, new_version: u64) -> BlockedAction {
        self.status
            .observer()
            .blocked(&self.status.name, old_version, new_version)
    }

    fn upgrade_needed(
        &mut self,
        scope: &mut dyn SchemaScope,
        old_version: u64,
        new_version: u64,
    ) -> stowage_engine::Result<()> {
        self.status.transition(ConnectionState::Upgrading);
        tracing::info!(
            database = %self.status.name,
            old_version,
            new_version,
            "upgrade needed"
        );

        let existing = scope.store_names()?;
        for definition in stores_needing_creation(&existing, self.definitions) {
            scope.create_store(&definition.store_name, &definition.key_path)?;
            tracing::debug!(
                store = %definition.store_name,
                key_path = %definition.key_path,
                "object store created"
            );
            self.created.push(definition.store_name.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use stowage_engine::{EngineError, Result};

    #[derive(Default)]
    struct Recorder {
        transitions: Mutex<Vec<(ConnectionState, ConnectionState)>>,
        evictions: Mutex<Vec<(u64, u64)>>,
    }

    impl LifecycleObserver for Recorder {
        fn state_changed(&self, _: &str, from: ConnectionState, to: ConnectionState) {
            self.transitions.lock().unwrap().push((from, to));
        }

        fn version_change(&self, _: &str, old_version: u64, new_version: u64) {
            self.evictions.lock().unwrap().push((old_version, new_version));
        }
    }

    struct FakeScope {
        stores: Vec<String>,
    }

    impl SchemaScope for FakeScope {
        fn store_names(&self) -> Result<Vec<String>> {
            Ok(self.stores.clone())
        }

        fn create_store(&mut self, name: &str, _key_path: &str) -> Result<()> {
            if self.stores.iter().any(|s| s == name) {
                return Err(EngineError::StoreExists(name.to_string()));
            }
            self.stores.push(name.to_string());
            Ok(())
        }
    }

    fn definitions() -> Vec<StoreDefinition> {
        vec![
            StoreDefinition::new("a", "id"),
            StoreDefinition::new("b", "id"),
        ]
    }

    #[test]
    fn test_tracker_creates_only_missing_stores() {
        let status = Arc::new(Status::new("db", Arc::new(LogObserver)));
        let definitions = definitions();
        let mut tracker = OpenTracker::new(&status, &definitions);
        let mut scope = FakeScope {
            stores: vec!["b".to_string()],
        };

        assert!(tracker.wants_upgrade(&scope.stores));
        tracker.upgrade_needed(&mut scope, 1, 1).unwrap();

        assert_eq!(tracker.created(), &["a".to_string()]);
        assert_eq!(scope.stores, vec!["b".to_string(), "a".to_string()]);
        assert!(!tracker.wants_upgrade(&scope.stores));
        assert_eq!(status.state(), ConnectionState::Upgrading);
    }

    #[test]
    fn test_transitions_are_reported_once() {
        let recorder = Arc::new(Recorder::default());
        let status = Status::new("db", recorder.clone());

        status.transition(ConnectionState::Opening);
        status.transition(ConnectionState::Opening);
        status.transition(ConnectionState::Ready);

        assert_eq!(
            *recorder.transitions.lock().unwrap(),
            vec![
                (ConnectionState::Closed, ConnectionState::Opening),
                (ConnectionState::Opening, ConnectionState::Ready),
            ]
        );
    }

    #[test]
    fn test_eviction_closes_and_is_not_overwritten_by_failure() {
        let recorder = Arc::new(Recorder::default());
        let status = Status::new("db", recorder.clone());
        status.transition(ConnectionState::Ready);

        status.evict(1, 2);
        status.fail();

        assert!(status.is_evicted());
        assert_eq!(status.state(), ConnectionState::Closed);
        assert_eq!(*recorder.evictions.lock().unwrap(), vec![(1, 2)]);
    }

    #[test]
    fn test_ready_refused_after_eviction() {
        let recorder = Arc::new(Recorder::default());
        let status = Status::new("db", recorder.clone());
        status.transition(ConnectionState::Opening);

        status.evict(1, 2);
        assert!(!status.ready());
        assert_eq!(status.state(), ConnectionState::Closed);

        let fresh = Status::new("db", recorder.clone());
        assert!(fresh.ready());
        assert_eq!(fresh.state(), ConnectionState::Ready);
    }

    #[test]
    fn test_store_listing_error_aborts_upgrade() {
        struct Broken;

        impl SchemaScope for Broken {
            fn store_names(&self) -> Result<Vec<String>> {
                Err(EngineError::Serialization("corrupt catalog".to_string()))
            }

            fn create_store(&mut self, name: &str, _key_path: &str) -> Result<()> {
                Err(EngineError::StoreExists(name.to_string()))
            }
        }

        let status = Arc::new(Status::new("db", Arc::new(LogObserver)));
        let definitions = definitions();
        let mut tracker = OpenTracker::new(&status, &definitions);

        let err = tracker.upgrade_needed(&mut Broken, 0, 1).unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
        assert!(tracker.created().is_empty());
    }

    #[test]
    fn test_default_blocked_action_waits() {
        assert_eq!(LogObserver.blocked("db", 1, 2), BlockedAction::Wait);
    }
}
