//! Task dispatch, liveness and aggregation

use crate::grid::task::TaskExecution;
use crate::grid::{
    lock, CancellationToken, Grid, GridError, GridNode, GridResult, GridTask, RunOn,
    RunningTask, SharedExecutions, TaskContext, TaskRecord, TaskResult, TaskState,
};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

impl Grid {
    /// Executes a task on the selected nodes and waits for every execution
    ///
    /// ONE tasks run on the coordinator, ALL tasks on every node joined at
    /// dispatch time (plus any node joining later through
    /// [`Grid::join_running_task`]). The result is COMPLETED only if every
    /// execution completed; a single FAILED execution fails the task with
    /// the first error in finish order. A failure does not abort sibling
    /// executions.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskResult)` - Aggregated outcome, whatever the task state
    /// * `Err(GridError)` - No node to run on, the same task already running,
    ///   or the grid store failing
    pub async fn execute_task(&self, task: &GridTask) -> GridResult<TaskResult> {
        let targets = match task.run_on {
            RunOn::All => self.nodes(),
            RunOn::One => vec![self.coordinator()?],
        };
        if targets.is_empty() {
            return Err(GridError::NoNodes(self.name.clone()));
        }

        let cancel = CancellationToken::new();
        let executions: SharedExecutions = Arc::new(Mutex::new(Vec::new()));
        {
            let mut running = lock(&self.running);
            if running.contains_key(&task.name) {
                return Err(GridError::DuplicateTask(task.name.clone()));
            }
            running.insert(
                task.name.clone(),
                RunningTask {
                    task: task.clone(),
                    cancel: cancel.clone(),
                    executions: executions.clone(),
                },
            );
        }

        info!(
            "Executing task '{}' ({:?}) on {} node(s)",
            task.name,
            task.run_on,
            targets.len()
        );

        let started_at = Utc::now();
        let record = TaskRecord {
            name: task.name.clone(),
            state: TaskState::Running,
            nodes: targets.iter().map(|n| n.name().to_string()).collect(),
            error: None,
            started_at,
            finished_at: None,
        };
        if let Err(e) = self.tasks.save(&task.name, &record) {
            lock(&self.running).remove(&task.name);
            return Err(e.into());
        }

        for node in &targets {
            self.dispatch(task, node, &cancel, &executions);
        }

        let result = self.await_executions(task, &cancel, &executions).await;

        // The final record lands before the task stops looking "running"
        let record = TaskRecord {
            state: result.state,
            nodes: result.executions.iter().map(|e| e.node.clone()).collect(),
            error: result.error.clone(),
            finished_at: Some(Utc::now()),
            ..record
        };
        if let Err(e) = self.tasks.save(&task.name, &record) {
            warn!(
                "Could not record the final state of task '{}': {}",
                task.name, e
            );
        }
        lock(&self.running).remove(&task.name);

        match result.state {
            TaskState::Completed => info!("Task '{}' completed", task.name),
            state => warn!(
                "Task '{}' ended {}: {}",
                task.name,
                state,
                result.error.as_deref().unwrap_or("no error reported")
            ),
        }
        Ok(result)
    }

    /// Adds a late-joining node to a running ALL task
    ///
    /// Returns false if the task is not running, is a ONE task, or already
    /// runs on that node.
    pub fn join_running_task(&self, task: &str, node: &str) -> GridResult<bool> {
        let node = self.node(node)?;
        let running = lock(&self.running);
        let Some(entry) = running.get(task) else {
            return Ok(false);
        };
        if entry.task.run_on != RunOn::All {
            return Ok(false);
        }
        if lock(&entry.executions).iter().any(|e| e.node() == node.name()) {
            return Ok(false);
        }

        info!("Node '{}' joins running task '{}'", node.name(), task);
        self.dispatch(&entry.task, &node, &entry.cancel, &entry.executions);
        Ok(true)
    }

    fn dispatch(
        &self,
        task: &GridTask,
        node: &Arc<GridNode>,
        cancel: &CancellationToken,
        executions: &SharedExecutions,
    ) {
        let execution = Arc::new(TaskExecution::new(node.name()));
        lock(executions).push(execution.clone());

        let handler = match node.registry().get(&task.handler) {
            Ok(handler) => handler,
            Err(e) => {
                warn!("Cannot run '{}' on node '{}': {}", task.name, node.name(), e);
                execution.fail(e.to_string());
                return;
            }
        };

        execution.start();
        debug!("Task '{}' running on node '{}'", task.name, node.name());

        let ctx = TaskContext {
            node: node.name().to_string(),
            task: task.name.clone(),
            params: task.params.clone(),
            cancel: cancel.clone(),
        };
        let interval = self.settings.heartbeat_interval;
        let node = node.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let heartbeat = {
                let execution = execution.clone();
                let node = node.clone();
                tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        ticker.tick().await;
                        if node.is_responsive() {
                            execution.beat();
                        } else {
                            trace!("Node '{}' is silent", node.name());
                        }
                    }
                })
            };

            // Handlers run in their own task so a panic surfaces as a failure
            let outcome = tokio::spawn(handler(ctx)).await;
            heartbeat.abort();

            match outcome {
                Ok(Ok(value)) => {
                    if cancel.is_cancelled() {
                        execution.cancel();
                    } else {
                        execution.complete(value);
                    }
                }
                Ok(Err(e)) => {
                    execution.fail(format!("{:#}", e));
                }
                Err(e) => {
                    execution.fail(format!("handler panicked on node '{}': {}", node.name(), e));
                }
            }
        });
    }

    async fn await_executions(
        &self,
        task: &GridTask,
        cancel: &CancellationToken,
        executions: &SharedExecutions,
    ) -> TaskResult {
        let timeout = self.settings.node_timeout;
        loop {
            let snapshot: Vec<Arc<TaskExecution>> = lock(executions).clone();

            if cancel.is_cancelled() {
                for execution in &snapshot {
                    execution.cancel();
                }
            }

            for execution in &snapshot {
                if execution.state() == TaskState::Running
                    && execution.last_heartbeat().elapsed() > timeout
                    && execution.fail(format!(
                        "node '{}' missed heartbeats for {:?}",
                        execution.node(),
                        timeout
                    ))
                {
                    warn!(
                        "Task '{}' failed on unresponsive node '{}'",
                        task.name,
                        execution.node()
                    );
                }
            }

            if snapshot.iter().all(|e| e.state().is_terminal()) {
                return TaskResult::aggregate(&task.name, task.run_on, &snapshot);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }
}
