//! Two grid handles over one SQLite file, as two processes would see it

use gridcrawl::grid::{Grid, GridSettings, GridTask, RunOn, TaskContext, TaskState};
use gridcrawl::store::{DataStoreEngine, SqliteEngine};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn open_grid(path: &Path) -> Grid {
    let engine: Arc<dyn DataStoreEngine> = Arc::new(SqliteEngine::new(path).unwrap());
    let settings = GridSettings {
        heartbeat_interval: Duration::from_millis(20),
        node_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(10),
    };
    Grid::new("shared", engine, settings).unwrap()
}

#[tokio::test]
async fn test_stop_flag_is_shared_through_the_store() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("grid.db");
    let first = open_grid(&db_path);
    let second = open_grid(&db_path);

    assert!(!second.is_stop_requested().unwrap());
    first.request_stop().unwrap();
    assert!(second.is_stop_requested().unwrap());

    second.clear_stop_request().unwrap();
    assert!(!first.is_stop_requested().unwrap());
}

#[tokio::test]
async fn test_task_records_are_shared_through_the_store() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("grid.db");
    let first = open_grid(&db_path);
    let second = open_grid(&db_path);

    let node = first.join("node-1");
    node.registry().register("count", |ctx: TaskContext| async move {
        Ok::<Option<Value>, anyhow::Error>(Some(json!({ "node": ctx.node })))
    });

    let result = first
        .execute_task(&GridTask::new("count-once", RunOn::One, "count"))
        .await
        .unwrap();
    assert!(result.is_completed());

    let record = second.task_record("count-once").unwrap().unwrap();
    assert_eq!(record.state, TaskState::Completed);
    assert_eq!(record.nodes, vec!["node-1"]);
    assert!(record.finished_at.is_some());
}

#[tokio::test]
async fn test_all_task_reports_every_failure_node() {
    let dir = TempDir::new().unwrap();
    let grid = open_grid(&dir.path().join("grid.db"));

    for name in ["node-1", "node-2", "node-3"] {
        let node = grid.join(name);
        node.registry().register("check", |ctx: TaskContext| async move {
            if ctx.node == "node-2" {
                return Err(anyhow::anyhow!("volume not mounted on {}", ctx.node));
            }
            Ok::<Option<Value>, anyhow::Error>(None)
        });
    }

    let result = grid
        .execute_task(&GridTask::new("check-all", RunOn::All, "check"))
        .await
        .unwrap();

    assert_eq!(result.state, TaskState::Failed);
    assert_eq!(result.executions.len(), 3);
    assert!(result.error.unwrap().contains("volume not mounted on node-2"));
    let completed = result
        .executions
        .iter()
        .filter(|e| e.state == TaskState::Completed)
        .count();
    assert_eq!(completed, 2);
}
