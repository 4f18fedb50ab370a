//! Grid task descriptors, states and results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Which nodes execute a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOn {
    /// Every node joined at dispatch time
    All,
    /// Exactly one node, the grid coordinator
    One,
}

/// State of a task execution, and of a task as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// A named unit of work, resolved to a registered handler on each node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridTask {
    /// Unique among the tasks running on the grid
    pub name: String,
    pub run_on: RunOn,
    /// Handler name looked up in each node's task registry
    pub handler: String,
    #[serde(default)]
    pub params: Value,
}

impl GridTask {
    pub fn new(name: impl Into<String>, run_on: RunOn, handler: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            run_on,
            handler: handler.into(),
            params: Value::Null,
        }
    }

    /// Task whose handler has the same name as the task
    pub fn named(name: impl Into<String>, run_on: RunOn) -> Self {
        let name = name.into();
        Self::new(name.clone(), run_on, name)
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }
}

/// Outcome of one node's execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub node: String,
    pub state: TaskState,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Aggregate outcome of a task over every node that executed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: String,
    pub state: TaskState,
    /// The single execution's value, or a node-keyed object for ALL tasks
    pub result: Option<Value>,
    /// First error in finish order
    pub error: Option<String>,
    pub executions: Vec<ExecutionReport>,
}

impl TaskResult {
    pub fn is_completed(&self) -> bool {
        self.state == TaskState::Completed
    }

    /// Aggregates executions: any FAILED wins, then any CANCELLED, else COMPLETED
    pub(crate) fn aggregate(task: &str, run_on: RunOn, executions: &[std::sync::Arc<TaskExecution>]) -> Self {
        let mut finished: Vec<(u64, ExecutionReport)> =
            executions.iter().map(|e| (e.finish_seq(), e.report())).collect();
        finished.sort_by_key(|(seq, _)| *seq);
        let reports: Vec<ExecutionReport> = finished.into_iter().map(|(_, r)| r).collect();

        let state = if reports.iter().any(|r| r.state == TaskState::Failed) {
            TaskState::Failed
        } else if reports.iter().any(|r| r.state == TaskState::Cancelled) {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        };

        let error = reports
            .iter()
            .find(|r| r.state == TaskState::Failed)
            .map(|r| r.error.clone().unwrap_or_else(|| format!("task failed on {}", r.node)));

        let result = match run_on {
            RunOn::One => reports.first().and_then(|r| r.result.clone()),
            RunOn::All => {
                let values: serde_json::Map<String, Value> = reports
                    .iter()
                    .filter_map(|r| r.result.clone().map(|v| (r.node.clone(), v)))
                    .collect();
                if values.is_empty() {
                    None
                } else {
                    Some(Value::Object(values))
                }
            }
        };

        Self {
            task: task.to_string(),
            state,
            result,
            error,
            executions: reports,
        }
    }
}

static FINISH_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct ExecutionInner {
    state: TaskState,
    result: Option<Value>,
    error: Option<String>,
    last_heartbeat: Instant,
    finish_seq: u64,
}

/// One node's execution of a task
///
/// PENDING -> RUNNING -> COMPLETED | FAILED | CANCELLED. Once terminal, further
/// transitions are ignored, so duplicate or late reports are harmless.
#[derive(Debug)]
pub(crate) struct TaskExecution {
    node: String,
    inner: Mutex<ExecutionInner>,
}

impl TaskExecution {
    pub(crate) fn new(node: &str) -> Self {
        Self {
            node: node.to_string(),
            inner: Mutex::new(ExecutionInner {
                state: TaskState::Pending,
                result: None,
                error: None,
                last_heartbeat: Instant::now(),
                finish_seq: u64::MAX,
            }),
        }
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut ExecutionInner) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub(crate) fn node(&self) -> &str {
        &self.node
    }

    pub(crate) fn state(&self) -> TaskState {
        self.with_inner(|i| i.state)
    }

    /// Applies a transition; returns false if the execution was already terminal
    pub(crate) fn transition(&self, state: TaskState, result: Option<Value>, error: Option<String>) -> bool {
        self.with_inner(|i| {
            if i.state.is_terminal() {
                return false;
            }
            i.state = state;
            if state == TaskState::Running {
                i.last_heartbeat = Instant::now();
            }
            if state.is_terminal() {
                i.result = result;
                i.error = error;
                i.finish_seq = FINISH_SEQ.fetch_add(1, Ordering::SeqCst);
            }
            true
        })
    }

    pub(crate) fn start(&self) -> bool {
        self.transition(TaskState::Running, None, None)
    }

    pub(crate) fn complete(&self, result: Option<Value>) -> bool {
        self.transition(TaskState::Completed, result, None)
    }

    pub(crate) fn fail(&self, error: impl Into<String>) -> bool {
        self.transition(TaskState::Failed, None, Some(error.into()))
    }

    pub(crate) fn cancel(&self) -> bool {
        self.transition(TaskState::Cancelled, None, None)
    }

    pub(crate) fn beat(&self) {
        self.with_inner(|i| i.last_heartbeat = Instant::now());
    }

    pub(crate) fn last_heartbeat(&self) -> Instant {
        self.with_inner(|i| i.last_heartbeat)
    }

    fn finish_seq(&self) -> u64 {
        self.with_inner(|i| i.finish_seq)
    }

    fn report(&self) -> ExecutionReport {
        self.with_inner(|i| ExecutionReport {
            node: self.node.clone(),
            state: i.state,
            result: i.result.clone(),
            error: i.error.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_terminal_state_is_final() {
        let exec = TaskExecution::new("n1");
        assert_eq!(exec.state(), TaskState::Pending);
        assert!(exec.start());
        assert!(exec.complete(None));
        assert!(!exec.fail("late"));
        assert!(!exec.cancel());
        assert_eq!(exec.state(), TaskState::Completed);
    }

    #[test]
    fn test_aggregate_one_failure_fails_all_task() {
        let execs: Vec<Arc<TaskExecution>> = ["n1", "n2", "n3"]
            .iter()
            .map(|n| Arc::new(TaskExecution::new(n)))
            .collect();
        for e in &execs {
            e.start();
        }
        execs[0].complete(None);
        execs[2].fail("disk full");
        execs[1].complete(Some(Value::from(2)));

        let result = TaskResult::aggregate("t", RunOn::All, &execs);
        assert_eq!(result.state, TaskState::Failed);
        assert_eq!(result.error.as_deref(), Some("disk full"));
        assert_eq!(result.result, Some(serde_json::json!({"n2": 2})));
        assert_eq!(result.executions.len(), 3);
    }

    #[test]
    fn test_aggregate_first_error_in_finish_order() {
        let execs: Vec<Arc<TaskExecution>> =
            ["a", "b"].iter().map(|n| Arc::new(TaskExecution::new(n))).collect();
        execs[1].fail("second node first");
        execs[0].fail("first node second");

        let result = TaskResult::aggregate("t", RunOn::All, &execs);
        assert_eq!(result.error.as_deref(), Some("second node first"));
    }

    #[test]
    fn test_aggregate_cancelled_and_completed() {
        let execs: Vec<Arc<TaskExecution>> =
            ["a", "b"].iter().map(|n| Arc::new(TaskExecution::new(n))).collect();
        execs[0].complete(None);
        execs[1].cancel();
        assert_eq!(
            TaskResult::aggregate("t", RunOn::All, &execs).state,
            TaskState::Cancelled
        );

        let single = vec![Arc::new(TaskExecution::new("a"))];
        single[0].complete(Some(Value::from("done")));
        let result = TaskResult::aggregate("t", RunOn::One, &single);
        assert!(result.is_completed());
        assert_eq!(result.result, Some(Value::from("done")));
    }

    #[test]
    fn test_task_serialization() {
        let task = GridTask::named("crawl-run", RunOn::All);
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["run_on"], "all");
        assert_eq!(json["handler"], "crawl-run");
        assert_eq!(serde_json::to_value(TaskState::Completed).unwrap(), "COMPLETED");
    }
}
