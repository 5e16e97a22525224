//! Lifecycle events emitted by the retry service.
//!
//! Events are plain `(type, payload)` pairs delivered to an [`EventSink`].
//! The service emits the types listed in [`types`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, RecordedEvent};

/// Event types emitted by the retry service.
pub mod types {
    /// A retry request passed validation.
    pub const RETRY_VALIDATED: &str = "retry.validated";
    /// A retry request was rejected.
    pub const RETRY_REJECTED: &str = "retry.rejected";
    /// The compiled plan was rewritten for retry.
    pub const RETRY_PLAN_REWRITTEN: &str = "retry.plan_rewritten";
    /// The retry execution was handed to the runtime.
    pub const RETRY_STARTED: &str = "retry.started";
}
