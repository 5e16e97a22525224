//! Error types for retry and resume planning.
//!
//! Every fallible operation in this crate returns a [`RetryError`]. The four
//! primary kinds mirror how callers must react:
//!
//! - [`RetryError::NotResumable`]: the execution cannot be retried; show the
//!   message to the user, never retry automatically.
//! - [`RetryError::InvalidRequest`]: the caller asked for something outside
//!   the valid set (unknown stage, malformed definition).
//! - [`RetryError::UpstreamUnavailable`]: a collaborator (ledger, store,
//!   compiler, runtime) failed; the caller's own retry policy applies.
//! - [`RetryError::Invariant`]: a logic bug was detected; fail fast and alert.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::ports::StoreError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RetryError>;

/// The main error type for retry operations.
#[derive(Debug, Clone, Error)]
pub enum RetryError {
    /// The execution cannot be resumed.
    #[error("{}", .0.summary)]
    NotResumable(ErrorInfo),

    /// The request referenced identifiers outside the valid set.
    #[error("{}", .0.summary)]
    InvalidRequest(ErrorInfo),

    /// A collaborator call failed.
    #[error("{0}")]
    UpstreamUnavailable(#[from] StoreError),

    /// An internal invariant was violated.
    #[error("Invariant violated: {}", .0.summary)]
    Invariant(ErrorInfo),

    /// A YAML document could not be parsed or rendered.
    #[error("YAML error: {0}")]
    Yaml(String),

    /// Serialization of a model type failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RetryError {
    /// Creates a not-resumable error.
    #[must_use]
    pub fn not_resumable(summary: impl Into<String>) -> Self {
        Self::NotResumable(ErrorInfo::new(codes::NOT_RESUMABLE, summary))
    }

    /// Creates an invalid-request error.
    #[must_use]
    pub fn invalid_request(summary: impl Into<String>) -> Self {
        Self::InvalidRequest(ErrorInfo::new(codes::INVALID_REQUEST, summary))
    }

    /// Creates an invariant error.
    #[must_use]
    pub fn invariant(summary: impl Into<String>) -> Self {
        Self::Invariant(ErrorInfo::new(codes::INVARIANT, summary))
    }

    /// Creates an upstream error for the named collaborator.
    #[must_use]
    pub fn upstream(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(StoreError::new(collaborator, message))
    }

    /// Attaches a context entry to the error info, when the kind carries one.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Some(info) = self.info_mut() {
            info.context.insert(key.into(), value.into());
        }
        self
    }

    /// Attaches a fix hint to the error info, when the kind carries one.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        if let Some(info) = self.info_mut() {
            info.fix_hint = Some(hint.into());
        }
        self
    }

    /// Returns the structured error info, if any.
    #[must_use]
    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::NotResumable(info) | Self::InvalidRequest(info) | Self::Invariant(info) => {
                Some(info)
            }
            _ => None,
        }
    }

    fn info_mut(&mut self) -> Option<&mut ErrorInfo> {
        match self {
            Self::NotResumable(info) | Self::InvalidRequest(info) | Self::Invariant(info) => {
                Some(info)
            }
            _ => None,
        }
    }

    /// Returns the machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::NotResumable(info) | Self::InvalidRequest(info) | Self::Invariant(info) => {
                &info.code
            }
            Self::UpstreamUnavailable(_) => codes::UPSTREAM_UNAVAILABLE,
            Self::Yaml(_) => codes::YAML,
            Self::Serialization(_) => codes::SERIALIZATION,
        }
    }

    /// Returns true if the message is specific and actionable for end users.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotResumable(_) | Self::InvalidRequest(_) | Self::Yaml(_)
        )
    }

    /// Returns the message to show to an end user.
    ///
    /// Invariant and upstream failures are collapsed into a generic message;
    /// their detail belongs in logs and alerts, not in responses.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotResumable(info) | Self::InvalidRequest(info) => info.summary.clone(),
            Self::Yaml(message) => format!("Invalid pipeline YAML: {message}"),
            Self::UpstreamUnavailable(_) => {
                "A dependent service is unavailable. Please try again later.".to_string()
            }
            Self::Invariant(_) | Self::Serialization(_) => {
                "Retry failed due to an internal error.".to_string()
            }
        }
    }
}

impl From<serde_yaml::Error> for RetryError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml(err.to_string())
    }
}

impl From<serde_json::Error> for RetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error codes attached to [`ErrorInfo`].
pub mod codes {
    /// Execution cannot be resumed.
    pub const NOT_RESUMABLE: &str = "RETRY-001-NOT_RESUMABLE";
    /// Request outside the valid set.
    pub const INVALID_REQUEST: &str = "RETRY-002-INVALID_REQUEST";
    /// Collaborator failure.
    pub const UPSTREAM_UNAVAILABLE: &str = "RETRY-003-UPSTREAM";
    /// Logic bug detected.
    pub const INVARIANT: &str = "RETRY-004-INVARIANT";
    /// Malformed YAML.
    pub const YAML: &str = "RETRY-005-YAML";
    /// Serialization failure.
    pub const SERIALIZATION: &str = "RETRY-006-SERIALIZATION";
}

/// Structured diagnostics carried by user-facing and invariant errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorInfo {
    /// Error code (e.g., "RETRY-001-NOT_RESUMABLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("summary".to_string(), serde_json::json!(self.summary));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        if !self.context.is_empty() {
            map.insert("context".to_string(), serde_json::json!(self.context));
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_resumable_is_user_facing() {
        let err = RetryError::not_resumable("Execution is more than 30 days old. Cannot retry");
        assert!(err.is_user_facing());
        assert_eq!(err.code(), codes::NOT_RESUMABLE);
        assert_eq!(
            err.user_message(),
            "Execution is more than 30 days old. Cannot retry"
        );
    }

    #[test]
    fn test_invariant_hides_detail_from_users() {
        let err = RetryError::invariant("stage fqn pipeline.stages.s1 missing from plan")
            .with_context("fqn", "pipeline.stages.s1");

        assert!(!err.is_user_facing());
        assert!(!err.user_message().contains("pipeline.stages.s1"));
        assert!(err.to_string().contains("pipeline.stages.s1"));
        assert_eq!(
            err.info().and_then(|i| i.context.get("fqn")).map(String::as_str),
            Some("pipeline.stages.s1")
        );
    }

    #[test]
    fn test_upstream_from_store_error() {
        let err: RetryError = StoreError::new("ledger", "connection reset").into();
        assert_eq!(err.code(), codes::UPSTREAM_UNAVAILABLE);
        assert!(err.to_string().contains("ledger"));
        assert!(err.info().is_none());
    }

    #[test]
    fn test_fix_hint_and_dict() {
        let err = RetryError::invalid_request("unknown stage")
            .with_fix_hint("Pick a stage from the previous execution");
        let dict = err.info().map(ErrorInfo::to_dict).unwrap_or_default();

        assert_eq!(dict.get("code").unwrap(), codes::INVALID_REQUEST);
        assert_eq!(
            dict.get("fix_hint").unwrap(),
            "Pick a stage from the previous execution"
        );
    }
}
