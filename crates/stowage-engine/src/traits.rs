//! Engine traits: the abstract contract of the transactional object store.
//!
//! These traits allow the connection layer to be engine-agnostic.
//! Implementations include SQLite (persistent) and in-memory (for tests).

use std::ops::Bound;

use async_trait::async_trait;
use stowage_core::{Key, Record};

use crate::error::Result;
use crate::handles::CloseHandle;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Reads only; writes fail with `ReadOnly`.
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
}

/// What an open should do when older connections refuse to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockedAction {
    /// Stall until every older connection closes.
    #[default]
    Wait,
    /// Give up and fail the open with `Blocked`.
    Abort,
}

/// Notification delivered to live handles when another open upgrades the
/// database.
#[derive(Debug)]
pub struct VersionChange {
    /// Version of the notified handle.
    pub old_version: u64,
    /// Version being installed.
    pub new_version: u64,
    handle: CloseHandle,
}

impl VersionChange {
    pub(crate) fn new(old_version: u64, new_version: u64, handle: CloseHandle) -> Self {
        Self {
            old_version,
            new_version,
            handle,
        }
    }

    /// Close the notified handle, unblocking the pending upgrade.
    pub fn close(&self) {
        self.handle.close();
    }
}

/// Callback invoked synchronously when a version change is requested.
pub type VersionChangeListener = Box<dyn Fn(&VersionChange) + Send + Sync>;

/// Callbacks driven by [`Engine::open`].
///
/// All methods are synchronous and run on the task performing the open.
pub trait OpenHooks: Send {
    /// Whether an upgrade is needed even though the version is unchanged.
    ///
    /// Called with the names of the stores that already exist.
    fn wants_upgrade(&self, existing: &[String]) -> bool {
        let _ = existing;
        false
    }

    /// Listener to attach to the returned handle.
    ///
    /// Called once, after any upgrade and before the handle becomes visible
    /// to other opens, so no version change can slip past it.
    fn version_change_listener(&mut self) -> Option<VersionChangeListener> {
        None
    }

    /// Older connections are still open after being notified.
    fn blocked(&mut self, old_version: u64, new_version: u64) -> BlockedAction {
        let _ = (old_version, new_version);
        BlockedAction::Wait
    }

    /// Apply schema changes inside the atomic version-change scope.
    ///
    /// Returning an error rolls back the whole upgrade.
    fn upgrade_needed(
        &mut self,
        scope: &mut dyn SchemaScope,
        old_version: u64,
        new_version: u64,
    ) -> Result<()>;
}

/// Schema operations available during an upgrade.
pub trait SchemaScope {
    /// Names of the stores present in the database, sorted.
    fn store_names(&self) -> Result<Vec<String>>;

    /// Create an auto-increment object store.
    ///
    /// Fails with `StoreExists` if the name is taken.
    fn create_store(&mut self, name: &str, key_path: &str) -> Result<()>;
}

/// Record operations inside one atomic transaction.
///
/// Every method is restricted to the stores the transaction was opened on.
pub trait Scope {
    /// The key path of a store in scope.
    fn key_path(&self, store: &str) -> Result<String>;

    /// Point lookup.
    fn get(&self, store: &str, key: &Key) -> Result<Option<Record>>;

    /// Insert a record, generating its key when the key field is absent.
    ///
    /// Returns the stored key and record (with the key injected). Fails with
    /// `Constraint` when the key is taken.
    fn add(&mut self, store: &str, record: Record) -> Result<(Key, Record)>;

    /// Insert or fully replace a record.
    fn put(&mut self, store: &str, record: Record) -> Result<(Key, Record)>;

    /// Delete by key; absent keys are not an error.
    fn delete(&mut self, store: &str, key: &Key) -> Result<()>;

    /// The first record, in ascending key order, within the given bounds.
    fn seek(
        &self,
        store: &str,
        lower: &Bound<Key>,
        upper: &Bound<Key>,
    ) -> Result<Option<(Key, Record)>>;
}

/// An open handle to one logical database.
///
/// Handles are closed explicitly, on drop, or by the version-change listener
/// supplied through [`OpenHooks::version_change_listener`].
/// Any transaction on a closed handle fails with `Closed`.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Database name.
    fn name(&self) -> &str;

    /// Version this handle was opened at.
    fn version(&self) -> u64;

    /// Store names visible to this handle, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Key path of a store, if it exists.
    fn key_path(&self, store: &str) -> Option<String>;

    /// Close the handle. Idempotent.
    fn close(&self);

    /// Whether the handle is closed.
    fn is_closed(&self) -> bool;

    /// Run `work` inside an atomic transaction over `stores`.
    ///
    /// Commits when `work` returns `Ok`; rolls back everything otherwise.
    async fn transaction<F, T>(&self, stores: &[&str], mode: TxMode, work: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Scope) -> Result<T> + Send + 'static,
        T: Send + 'static;
}

/// An engine: opens versioned databases by name.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Handle type returned by [`open`](Self::open).
    type Database: Database;

    /// Whether the engine can be used in this environment.
    fn is_available(&self) -> bool {
        true
    }

    /// Open `name` at `version`.
    ///
    /// When the requested version is newer than the stored one (or
    /// `hooks.wants_upgrade` says so), live handles at an older version are
    /// notified, `hooks.blocked` is called if any stay open, and then
    /// `hooks.upgrade_needed` runs atomically before the handle is returned.
    async fn open(
        &self,
        name: &str,
        version: u64,
        hooks: &mut dyn OpenHooks,
    ) -> Result<Self::Database>;
}
