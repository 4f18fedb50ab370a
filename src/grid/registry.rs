//! Task handler registry
//!
//! Each node maps handler names to async closures. A dispatched `GridTask`
//! only carries the handler name and its parameters; the receiving node
//! resolves the name against its own registry.

use crate::grid::{CancellationToken, GridError, GridResult};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

/// Everything a handler gets to know about the execution it runs
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub node: String,
    pub task: String,
    pub params: Value,
    pub cancel: CancellationToken,
}

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<Option<Value>>> + Send>>;

/// Type-erased async task handler
pub type TaskHandlerFn = Arc<dyn Fn(TaskContext) -> TaskFuture + Send + Sync>;

/// Handler name to implementation map of one node
#[derive(Default)]
pub struct TaskRegistry {
    handlers: RwLock<HashMap<String, TaskHandlerFn>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the handler for `name`
    pub fn register<F, Fut>(&self, name: &str, handler: F)
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
    {
        let handler_fn: TaskHandlerFn =
            Arc::new(move |ctx: TaskContext| Box::pin(handler(ctx)) as TaskFuture);

        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.insert(name.to_string(), handler_fn);
        tracing::debug!("Registered task handler: {}", name);
    }

    pub fn get(&self, name: &str) -> GridResult<TaskHandlerFn> {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers
            .get(name)
            .cloned()
            .ok_or_else(|| GridError::UnknownHandler(name.to_string()))
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.remove(name).is_some()
    }

    /// Returns the registered handler names, sorted
    pub fn handler_names(&self) -> Vec<String> {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TaskContext {
        TaskContext {
            node: "n1".to_string(),
            task: "t".to_string(),
            params: Value::from(21),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let registry = TaskRegistry::new();
        registry.register("double", |ctx: TaskContext| async move {
            let n = ctx.params.as_i64().unwrap_or(0);
            Ok::<_, anyhow::Error>(Some(Value::from(n * 2)))
        });

        let handler = registry.get("double").unwrap();
        assert_eq!(handler(context()).await.unwrap(), Some(Value::from(42)));
        assert_eq!(registry.handler_names(), vec!["double".to_string()]);
    }

    #[test]
    fn test_unknown_handler() {
        let registry = TaskRegistry::new();
        assert!(matches!(registry.get("nope"), Err(GridError::UnknownHandler(_))));
        registry.register("x", |_| async { Ok::<Option<Value>, anyhow::Error>(None) });
        assert!(registry.unregister("x"));
        assert!(!registry.unregister("x"));
    }
}
