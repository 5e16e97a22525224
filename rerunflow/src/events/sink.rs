//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

/// Receiver of retry lifecycle events. Emitting must never fail.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event of `event_type` with an optional payload.
    async fn emit(&self, event_type: &str, data: Option<Value>);
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// A sink that writes events to `tracing` at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        info!(event_type = %event_type, event_data = ?data, "Event: {}", event_type);
    }
}

/// An event captured by [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// The event type.
    pub event_type: String,
    /// The event payload.
    pub data: Option<Value>,
}

/// A sink that keeps every event in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<RecordedEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type.starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.events.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            data,
        });
    }
}
