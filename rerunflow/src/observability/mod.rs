//! Logging setup and span helpers for retry orchestration.
//!
//! The library only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_tracing`] once at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "rerunflow=info";

/// Output format of the installed subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Installs a global `tracing` subscriber.
///
/// The filter is read from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
/// Returns false if a global subscriber was already installed.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };
    result.is_ok()
}

/// Attributes attached to retry spans and log lines.
#[derive(Debug, Clone, Default)]
pub struct RetrySpanAttributes {
    /// Execution being retried.
    pub previous_execution_id: Option<String>,
    /// Execution created by the retry.
    pub new_execution_id: Option<String>,
    /// Pipeline identifier.
    pub pipeline_identifier: Option<String>,
    /// Stages selected for retry.
    pub retry_stages: Vec<String>,
}

impl RetrySpanAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution being retried.
    #[must_use]
    pub fn with_previous_execution_id(mut self, id: impl Into<String>) -> Self {
        self.previous_execution_id = Some(id.into());
        self
    }

    /// Sets the execution created by the retry.
    #[must_use]
    pub fn with_new_execution_id(mut self, id: impl Into<String>) -> Self {
        self.new_execution_id = Some(id.into());
        self
    }

    /// Sets the pipeline identifier.
    #[must_use]
    pub fn with_pipeline_identifier(mut self, id: impl Into<String>) -> Self {
        self.pipeline_identifier = Some(id.into());
        self
    }

    /// Sets the retried stages.
    #[must_use]
    pub fn with_retry_stages(mut self, stages: &[String]) -> Self {
        self.retry_stages = stages.to_vec();
        self
    }

    /// Flattens the attributes into dotted keys.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        if let Some(ref v) = self.previous_execution_id {
            attrs.insert("retry.previous_execution_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.new_execution_id {
            attrs.insert("retry.new_execution_id".to_string(), v.clone());
        }
        if let Some(ref v) = self.pipeline_identifier {
            attrs.insert("pipeline.identifier".to_string(), v.clone());
        }
        if !self.retry_stages.is_empty() {
            attrs.insert("retry.stages".to_string(), self.retry_stages.join(","));
        }
        attrs
    }
}

/// Measures the wall time of a named operation.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: &'static str,
}

impl SpanTimer {
    /// Starts a timer.
    #[must_use]
    pub fn start(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Stops the timer and logs the duration in milliseconds at debug level.
    pub fn finish(self) -> f64 {
        let duration_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(operation = self.name, duration_ms, "Operation finished");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_flatten() {
        let attrs = RetrySpanAttributes::new()
            .with_previous_execution_id("e1")
            .with_pipeline_identifier("deploy")
            .with_retry_stages(&["s3".to_string(), "s4".to_string()])
            .to_attributes();

        assert_eq!(attrs.get("retry.previous_execution_id"), Some(&"e1".to_string()));
        assert_eq!(attrs.get("pipeline.identifier"), Some(&"deploy".to_string()));
        assert_eq!(attrs.get("retry.stages"), Some(&"s3,s4".to_string()));
        assert!(!attrs.contains_key("retry.new_execution_id"));
    }

    #[test]
    fn test_span_timer() {
        assert!(SpanTimer::start("partition").finish() >= 0.0);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        let _ = init_tracing(LogFormat::Json);
        assert!(!init_tracing(LogFormat::Pretty));
    }

    #[test]
    fn test_log_format_serde() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
    }
}
