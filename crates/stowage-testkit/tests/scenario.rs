//! The reference scenario, run against every engine.

use serde_json::json;
use stowage::engine::{Engine, MemoryEngine, SqliteEngine};
use stowage_testkit::fixtures::{ids, open_scenario, record, ITEMS};

async fn run_scenario<E: Engine>(engine: &E) {
    let conn = open_scenario(engine).await.unwrap();

    assert_eq!(conn.length(ITEMS).unwrap(), Some(2));

    let done = conn.get_where(ITEMS, "done", true).await.unwrap();
    assert_eq!(done, vec![record(json!({ "id": 2, "done": true }))]);

    let added = conn.add(ITEMS, record(json!({ "done": false }))).await.unwrap();
    assert_eq!(added["id"], json!(3));

    let all = conn.get_all(ITEMS).await.unwrap();
    assert_eq!(ids(&all), vec![json!(1), json!(2), json!(3)]);

    conn.remove_where(ITEMS, "done", true).await.unwrap();
    assert_eq!(
        conn.get_all(ITEMS).await.unwrap(),
        vec![
            record(json!({ "id": 1, "done": false })),
            record(json!({ "id": 3, "done": false })),
        ]
    );
}

#[tokio::test]
async fn scenario_on_memory_engine() {
    run_scenario(&MemoryEngine::new()).await;
}

#[tokio::test]
async fn scenario_on_sqlite_in_memory() {
    run_scenario(&SqliteEngine::in_memory()).await;
}

#[tokio::test]
async fn scenario_on_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    run_scenario(&SqliteEngine::open_dir(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn cleared_store_recomputes_to_zero() {
    let engine = MemoryEngine::new();
    let conn = open_scenario(&engine).await.unwrap();

    conn.clear(ITEMS).await.unwrap();
    assert!(conn.get_all(ITEMS).await.unwrap().is_empty());
    assert_eq!(conn.recompute(ITEMS).await.unwrap(), 0);
    assert_eq!(conn.length(ITEMS).unwrap(), Some(0));

    // Cleared keys are not handed out again.
    let added = conn.add(ITEMS, record(json!({}))).await.unwrap();
    assert_eq!(added["id"], json!(3));
}
