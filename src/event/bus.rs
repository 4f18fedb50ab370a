//! Process-wide event bus

use crate::event::CrawlerEvent;
use std::sync::{Arc, RwLock};

/// Callback invoked for every fired event
pub type EventListener = Arc<dyn Fn(&CrawlerEvent) + Send + Sync>;

/// Dispatches crawler events to registered listeners
///
/// Listeners run synchronously on the firing thread, outside of the
/// registry lock, so a listener may itself fire events.
#[derive(Default)]
pub struct EventManager {
    listeners: RwLock<Vec<EventListener>>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&CrawlerEvent) + Send + Sync + 'static,
    {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(Arc::new(listener));
    }

    pub fn fire(&self, event: CrawlerEvent) {
        tracing::debug!(
            event = %event.name,
            reference = event.reference.as_deref().unwrap_or("-"),
            node = event.node.as_deref().unwrap_or("-"),
            "{}",
            event.message.as_deref().unwrap_or("")
        );

        let listeners: Vec<EventListener> = match self.listeners.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn clear_listeners(&self) {
        match self.listeners.write() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}
