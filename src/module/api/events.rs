//! Event bus for module-to-module messaging
//!
//! Handlers run synchronously on the publisher's call path. The handler map
//! lock is released before any handler runs, so handlers may subscribe or
//! publish themselves. Handler failures and panics are logged and contained.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error};

use crate::utils::panic::panic_message;
use crate::utils::time::current_timestamp;

/// Subscribing to this type receives every event
pub const WILDCARD: &str = "*";

/// An immutable notification published on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    /// Module ID (or `core`) that published the event
    pub source: String,
    /// Unix seconds; zero means "stamp at publish time"
    #[serde(default)]
    pub timestamp: u64,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: HashMap::new(),
            source: source.into(),
            timestamp: 0,
        }
    }

    /// Add a payload entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// Event handler callback
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// In-process publish/subscribe channel shared by all modules
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Append a handler for an exact event type, or [`WILDCARD`] for all
    pub fn subscribe<F>(&self, event_type: &str, handler: F)
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers
            .entry(event_type.to_string())
            .or_default()
            .push(Arc::new(handler));
        debug!("Subscribed handler to event type {}", event_type);
    }

    /// Deliver an event to every handler registered at this moment
    ///
    /// Type-specific handlers run first, then wildcard handlers. Never fails.
    pub fn publish(&self, mut event: Event) {
        if event.timestamp == 0 {
            event.timestamp = current_timestamp();
        }

        let snapshot: Vec<EventHandler> = {
            let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            let mut snapshot = Vec::new();
            if event.event_type != WILDCARD {
                if let Some(typed) = handlers.get(&event.event_type) {
                    snapshot.extend(typed.iter().cloned());
                }
            }
            if let Some(wildcard) = handlers.get(WILDCARD) {
                snapshot.extend(wildcard.iter().cloned());
            }
            snapshot
        };

        debug!(
            "Publishing event {} from {} to {} handler(s)",
            event.event_type,
            event.source,
            snapshot.len()
        );

        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        event_type = %event.event_type,
                        source = %event.source,
                        "Event handler failed: {:#}",
                        e
                    );
                }
                Err(payload) => {
                    error!(
                        event_type = %event.event_type,
                        source = %event.source,
                        "Event handler panicked: {}",
                        panic_message(payload)
                    );
                }
            }
        }
    }

    /// Number of handlers registered for an exact type
    pub fn handler_count(&self, event_type: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(event_type).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
