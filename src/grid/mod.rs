//! Grid coordination
//!
//! This module provides the abstraction over one or many cooperating crawl
//! nodes:
//! - Nodes joining and leaving a named grid
//! - Per-node task registries resolving task names to handlers
//! - The compute layer dispatching a task to one or all nodes, with
//!   heartbeats, liveness timeout, cancellation and fail-fast aggregation
//! - Grid pipelines whose stages are grid tasks
//!
//! Task states, pipeline progress and the stop flag are written to the shared
//! store, so processes sharing a SQLite store see each other's control state.

mod cancel;
mod compute;
pub mod pipeline;
mod registry;
mod task;

pub use cancel::CancellationToken;
pub use pipeline::{GridPipeline, GridPipelineStage, PipelineRecord, PipelineResult, StageOutcome};
pub use registry::{TaskContext, TaskFuture, TaskHandlerFn, TaskRegistry};
pub use task::{ExecutionReport, GridTask, RunOn, TaskResult, TaskState};

use crate::config::GridConfig;
use crate::store::{DataStore, DataStoreEngine, StoreError, TypedStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use thiserror::Error;
use task::TaskExecution;

const STOP_KEY: &str = "stop-requested";

/// Errors raised by the grid itself, as opposed to task failures
#[derive(Debug, Error)]
pub enum GridError {
    #[error("No node joined grid '{0}'")]
    NoNodes(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown task handler: {0}")]
    UnknownHandler(String),

    #[error("Task '{0}' is already running")]
    DuplicateTask(String),

    #[error("Duplicate pipeline stage: {0}")]
    DuplicateStage(String),

    #[error("Grid store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for grid operations
pub type GridResult<T> = Result<T, GridError>;

/// Timing of heartbeats, liveness checks and polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSettings {
    pub heartbeat_interval: Duration,
    /// Silence after which a running execution is failed
    pub node_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

impl From<&GridConfig> for GridSettings {
    fn from(config: &GridConfig) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval(),
            node_timeout: config.node_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// A member of the grid
pub struct GridNode {
    name: String,
    registry: TaskRegistry,
    responsive: AtomicBool,
}

impl GridNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            registry: TaskRegistry::new(),
            responsive: AtomicBool::new(true),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Whether the node still sends heartbeats
    pub fn is_responsive(&self) -> bool {
        self.responsive.load(Ordering::SeqCst)
    }

    /// Turning this off simulates a hung or partitioned node
    pub fn set_responsive(&self, responsive: bool) {
        self.responsive.store(responsive, Ordering::SeqCst);
    }
}

/// Last known state of a task, as persisted in the grid store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub state: TaskState,
    pub nodes: Vec<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

type SharedExecutions = Arc<Mutex<Vec<Arc<TaskExecution>>>>;

struct RunningTask {
    task: GridTask,
    cancel: CancellationToken,
    executions: SharedExecutions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A named group of nodes sharing one store
pub struct Grid {
    name: String,
    settings: GridSettings,
    engine: Arc<dyn DataStoreEngine>,
    nodes: RwLock<Vec<Arc<GridNode>>>,
    running: Mutex<HashMap<String, RunningTask>>,
    tasks: TypedStore<TaskRecord>,
    pipelines: TypedStore<PipelineRecord>,
    control: Arc<dyn DataStore>,
}

impl Grid {
    pub fn new(
        name: impl Into<String>,
        engine: Arc<dyn DataStoreEngine>,
        settings: GridSettings,
    ) -> GridResult<Self> {
        let tasks = TypedStore::new(engine.open_store("grid-tasks")?);
        let pipelines = TypedStore::new(engine.open_store("grid-pipelines")?);
        let control = engine.open_store("grid-control")?;

        Ok(Self {
            name: name.into(),
            settings,
            engine,
            nodes: RwLock::new(Vec::new()),
            running: Mutex::new(HashMap::new()),
            tasks,
            pipelines,
            control,
        })
    }

    pub fn from_config(config: &GridConfig, engine: Arc<dyn DataStoreEngine>) -> GridResult<Self> {
        Self::new(config.name.clone(), engine, GridSettings::from(config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &GridSettings {
        &self.settings
    }

    /// The store engine shared by everything running on this grid
    pub fn engine(&self) -> &Arc<dyn DataStoreEngine> {
        &self.engine
    }

    /// Adds a node, or returns it if it already joined
    pub fn join(&self, node: &str) -> Arc<GridNode> {
        let mut nodes = match self.nodes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = nodes.iter().find(|n| n.name == node) {
            return existing.clone();
        }
        let joined = Arc::new(GridNode::new(node));
        nodes.push(joined.clone());
        tracing::info!("Node '{}' joined grid '{}' ({} nodes)", node, self.name, nodes.len());
        joined
    }

    /// Removes a node; its running executions stop heartbeating and time out
    pub fn leave(&self, node: &str) -> GridResult<()> {
        let mut nodes = match self.nodes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let index = nodes
            .iter()
            .position(|n| n.name == node)
            .ok_or_else(|| GridError::UnknownNode(node.to_string()))?;
        let removed = nodes.remove(index);
        removed.set_responsive(false);
        tracing::info!("Node '{}' left grid '{}'", node, self.name);
        Ok(())
    }

    pub fn node(&self, name: &str) -> GridResult<Arc<GridNode>> {
        self.nodes()
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| GridError::UnknownNode(name.to_string()))
    }

    /// Joined nodes, in join order
    pub fn nodes(&self) -> Vec<Arc<GridNode>> {
        match self.nodes.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes().iter().map(|n| n.name.clone()).collect()
    }

    /// The node running single-node tasks: the earliest joined one
    pub fn coordinator(&self) -> GridResult<Arc<GridNode>> {
        self.nodes()
            .into_iter()
            .next()
            .ok_or_else(|| GridError::NoNodes(self.name.clone()))
    }

    pub fn is_coordinator(&self, node: &str) -> bool {
        self.coordinator().map(|c| c.name == node).unwrap_or(false)
    }

    /// Raises the stop flag seen by every node sharing the store
    pub fn request_stop(&self) -> GridResult<()> {
        self.control.save(STOP_KEY, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    pub fn is_stop_requested(&self) -> GridResult<bool> {
        Ok(self.control.exists(STOP_KEY)?)
    }

    pub fn clear_stop_request(&self) -> GridResult<()> {
        self.control.delete(STOP_KEY)?;
        Ok(())
    }

    pub fn task_record(&self, task: &str) -> GridResult<Option<TaskRecord>> {
        Ok(self.tasks.find(task)?)
    }

    pub fn is_task_running(&self, task: &str) -> bool {
        lock(&self.running).contains_key(task)
    }

    /// Waits until a task is no longer running and returns its record
    pub async fn wait_for_task(&self, task: &str) -> GridResult<Option<TaskRecord>> {
        while self.is_task_running(task) {
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        self.task_record(task)
    }

    /// Requests cancellation of a running task
    ///
    /// Returns false if no task by that name is running.
    pub fn cancel(&self, task: &str) -> bool {
        match lock(&self.running).get(task) {
            Some(running) => {
                tracing::info!("Cancelling task '{}'", task);
                running.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub(crate) fn pipeline_record(&self, pipeline: &str) -> GridResult<Option<PipelineRecord>> {
        Ok(self.pipelines.find(pipeline)?)
    }

    pub(crate) fn save_pipeline_record(&self, record: &PipelineRecord) -> GridResult<()> {
        self.pipelines.save(&record.pipeline, record)?;
        Ok(())
    }
}
