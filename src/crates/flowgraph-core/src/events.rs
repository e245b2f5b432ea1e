//! In-engine pub/sub: lifecycle events, feedback, custom graph events
//!
//! Every run owns one [`EventBus`]. The runtime publishes node lifecycle
//! events onto it, nodes publish feedback through their context, and custom
//! graph events (`event.trigger` / `event.listener` nodes) flow through it
//! as [`EngineEvent::EventFired`].
//!
//! Observers subscribe through a broadcast channel and are never awaited.
//! Graph-event *handlers* (the listener Exit paths registered at run start)
//! are awaited in registration order by [`EventBus::fire`], which keeps
//! firings deterministic.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::ErrorKind;

/// Severity attached to a feedback message
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSeverity {
    Info,
    Warning,
    Error,
}

/// Out-of-band message from a node to logging/UI consumers
///
/// Feedback never affects control flow.
#[derive(Debug, Clone)]
pub struct FeedbackMessage {
    /// Node that emitted the feedback
    pub node_id: String,
    /// Severity
    pub severity: FeedbackSeverity,
    /// Message text
    pub text: String,
    /// Optional consumer-defined routing tag
    pub tag: Option<String>,
    /// Emission time
    pub timestamp: DateTime<Utc>,
}

/// Events published by the engine during a run
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A node dispatch began
    NodeStarted {
        node_id: String,
        node_name: String,
    },
    /// A node dispatch completed without fault
    NodeCompleted {
        node_id: String,
        node_name: String,
    },
    /// A node dispatch faulted
    NodeFailed {
        node_id: String,
        node_name: String,
        kind: ErrorKind,
        message: String,
    },
    /// A node emitted feedback
    Feedback(FeedbackMessage),
    /// A custom graph event fired
    EventFired {
        event_id: String,
    },
}

/// Awaited handler for a custom graph event
pub type EventHandler = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-run publish/subscribe hub
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with a bounded observer backlog
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe as an observer
    ///
    /// Slow observers that fall more than the backlog behind see
    /// `RecvError::Lagged`, never engine backpressure.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to observers
    pub fn publish(&self, event: EngineEvent) {
        // Err only means no observers are subscribed.
        let _ = self.sender.send(event);
    }

    /// Register a handler for a custom graph event
    pub fn register_handler(&self, event_id: impl Into<String>, handler: EventHandler) {
        self.handlers
            .write()
            .expect("handler map poisoned")
            .entry(event_id.into())
            .or_default()
            .push(handler);
    }

    /// Fire a custom graph event
    ///
    /// Publishes [`EngineEvent::EventFired`] to observers, then awaits each
    /// registered handler in registration order.
    pub async fn fire(&self, event_id: &str) {
        debug!(event = %event_id, "graph event fired");
        self.publish(EngineEvent::EventFired {
            event_id: event_id.to_string(),
        });

        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .expect("handler map poisoned")
            .get(event_id)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler().await;
        }
    }

    /// Drop every registered handler
    ///
    /// Runs clear their listener wiring here when they end; handlers hold
    /// the run's runtime alive, so leaving them registered would leak it
    /// and re-fire stale listeners on a reused bus.
    pub fn clear_handlers(&self) {
        self.handlers.write().expect("handler map poisoned").clear();
    }

    /// Number of handlers registered for an event
    pub fn handler_count(&self, event_id: &str) -> usize {
        self.handlers
            .read()
            .expect("handler map poisoned")
            .get(event_id)
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.sender.receiver_count())
            .finish()
    }
}
