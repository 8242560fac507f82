//! Explicit event-handler registry
//!
//! Call sites dispatch an event type after finishing the action that caused
//! it; every handler registered for that type runs in registration order.

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::Result;

/// Callback invoked with the event type that fired
pub type EventHandler = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

/// Registry of handlers keyed by event type
#[derive(Default)]
pub struct EventHooks {
    handlers: DashMap<String, Vec<EventHandler>>,
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `event_type`
    pub fn register_handler<F>(&self, event_type: impl Into<String>, handler: F)
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Run every handler for `event_type`; returns how many ran
    ///
    /// Handler failures are logged and do not stop the remaining handlers.
    pub fn dispatch(&self, event_type: &str) -> usize {
        // clone out of the map so handlers may register further hooks
        let handlers: Vec<EventHandler> = match self.handlers.get(event_type) {
            Some(handlers) => handlers.clone(),
            None => return 0,
        };

        for handler in &handlers {
            if let Err(e) = handler(event_type) {
                log::error!("Error in event handler for {}: {}", event_type, e);
            }
        }
        handlers.len()
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, |h| h.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemoryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_runs_registered_handlers() {
        let hooks = EventHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        hooks.register_handler("goal_achieved", move |event| {
            assert_eq!(event, "goal_achieved");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(hooks.dispatch("goal_achieved"), 1);
        assert_eq!(hooks.dispatch("unrelated"), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_handler_does_not_stop_others() {
        let hooks = EventHooks::new();
        let calls = Arc::new(AtomicUsize::new(0));

        hooks.register_handler("crisis_point", |_| Err(MemoryError::other("boom")));
        let counter = Arc::clone(&calls);
        hooks.register_handler("crisis_point", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(hooks.handler_count("crisis_point"), 2);
        assert_eq!(hooks.dispatch("crisis_point"), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_may_register_more_handlers() {
        let hooks = Arc::new(EventHooks::new());
        let inner = Arc::clone(&hooks);
        hooks.register_handler("project_completed", move |_| {
            inner.register_handler("follow_up", |_| Ok(()));
            Ok(())
        });

        hooks.dispatch("project_completed");
        assert_eq!(hooks.handler_count("follow_up"), 1);
    }
}
