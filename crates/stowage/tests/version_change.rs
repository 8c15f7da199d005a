//! Version-change eviction and blocked opens across connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stowage::engine::{Engine, MemoryEngine, OpenHooks, SchemaScope};
use stowage::{
    BlockedAction, Connection, ConnectionState, LifecycleObserver, SchemaConfig, StoreDefinition,
    StowageError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(version: u64) -> SchemaConfig {
    SchemaConfig::new("T", version).store(
        StoreDefinition::new("items", "id")
            .with_initial_data(vec![json!({ "id": 1, "done": false }).as_object().cloned().unwrap()]),
    )
}

/// Opens a bare engine handle that never listens for version changes.
struct Bare;

impl OpenHooks for Bare {
    fn upgrade_needed(
        &mut self,
        _: &mut dyn SchemaScope,
        _: u64,
        _: u64,
    ) -> stowage::engine::Result<()> {
        Ok(())
    }
}

struct Counting {
    blocked: AtomicUsize,
    version_changes: AtomicUsize,
    action: BlockedAction,
}

impl Counting {
    fn new(action: BlockedAction) -> Arc<Self> {
        Arc::new(Self {
            blocked: AtomicUsize::new(0),
            version_changes: AtomicUsize::new(0),
            action,
        })
    }
}

impl LifecycleObserver for Counting {
    fn blocked(&self, _: &str, _: u64, _: u64) -> BlockedAction {
        self.blocked.fetch_add(1, Ordering::SeqCst);
        self.action
    }

    fn version_change(&self, _: &str, _: u64, _: u64) {
        self.version_changes.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn newer_version_evicts_older_connection() {
    init_tracing();
    let engine = MemoryEngine::new();
    let observer = Counting::new(BlockedAction::Abort);
    let old = Connection::open_with(&engine, &config(1), observer.clone())
        .await
        .unwrap();

    let new = Connection::open(&engine, &config(2)).await.unwrap();

    assert_eq!(observer.version_changes.load(Ordering::SeqCst), 1);
    assert_eq!(observer.blocked.load(Ordering::SeqCst), 0);
    assert_eq!(old.state(), ConnectionState::Closed);
    assert!(matches!(
        old.get("items", 1).await,
        Err(StowageError::StaleConnection(_))
    ));
    assert!(matches!(old.length("items"), Err(StowageError::StaleConnection(_))));

    assert_eq!(new.version(), 2);
    assert_eq!(new.length("items").unwrap(), Some(1));
    assert!(new.seeded().is_empty());
}

#[tokio::test]
async fn same_version_reopen_keeps_older_connection() {
    let engine = MemoryEngine::new();
    let first = Connection::open(&engine, &config(1)).await.unwrap();
    let second = Connection::open(&engine, &config(1)).await.unwrap();

    assert_eq!(first.state(), ConnectionState::Ready);
    assert!(first.get("items", 1).await.unwrap().is_some());
    assert!(second.get("items", 1).await.unwrap().is_some());
}

#[tokio::test]
async fn blocked_open_can_abort() {
    init_tracing();
    let engine = MemoryEngine::new();
    let stubborn = engine.open("T", 1, &mut Bare).await.unwrap();
    let observer = Counting::new(BlockedAction::Abort);

    let err = Connection::open_with(&engine, &config(2), observer.clone())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StowageError::OpenBlocked {
            old_version: 1,
            new_version: 2,
            ..
        }
    ));
    assert_eq!(observer.blocked.load(Ordering::SeqCst), 1);

    // Nothing was upgraded.
    drop(stubborn);
    assert!(matches!(
        Connection::open(&engine, &config(1)).await,
        Ok(conn) if conn.seeded().len() == 1
    ));
}

#[tokio::test]
async fn blocked_open_waits_for_close() {
    init_tracing();
    let engine = MemoryEngine::new();
    let stubborn = engine.open("T", 1, &mut Bare).await.unwrap();
    let observer = Counting::new(BlockedAction::Wait);

    let closer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stubborn);
    });

    let conn = Connection::open_with(&engine, &config(2), observer.clone())
        .await
        .unwrap();
    closer.await.unwrap();

    assert_eq!(observer.blocked.load(Ordering::SeqCst), 1);
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert_eq!(conn.length("items").unwrap(), Some(1));
}
