//! Requests and responses of the retry service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::ExecutionStatus;
use crate::lineage::{ExecutionTriggerInfo, RetryExecutionMetadata, TriggeredBy};
use crate::plan::Plan;
use crate::ports::{ExecutionHandle, PlanExecutionMetadata};
use crate::retry::RetryGroup;

/// A request to retry a prior execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    /// Pipeline the execution belongs to.
    pub pipeline_identifier: String,
    /// Execution to retry.
    pub previous_execution_id: String,
    /// Stages the caller asked to re-run.
    pub retry_stages: Vec<String>,
    /// Re-run every requested stage instead of only the failed ones.
    #[serde(default)]
    pub run_all_stages: bool,
    /// Principal triggering the retry.
    pub triggered_by: TriggeredBy,
    /// Values handed to the runtime unchanged.
    #[serde(default)]
    pub abstractions: HashMap<String, String>,
}

impl RetryRequest {
    /// Creates a retry request.
    #[must_use]
    pub fn new(
        pipeline_identifier: impl Into<String>,
        previous_execution_id: impl Into<String>,
        retry_stages: Vec<String>,
    ) -> Self {
        Self {
            pipeline_identifier: pipeline_identifier.into(),
            previous_execution_id: previous_execution_id.into(),
            retry_stages,
            run_all_stages: false,
            triggered_by: TriggeredBy::new("system"),
            abstractions: HashMap::new(),
        }
    }

    /// Re-runs every requested stage.
    #[must_use]
    pub fn with_run_all_stages(mut self, run_all_stages: bool) -> Self {
        self.run_all_stages = run_all_stages;
        self
    }

    /// Sets the triggering principal.
    #[must_use]
    pub fn with_triggered_by(mut self, triggered_by: TriggeredBy) -> Self {
        self.triggered_by = triggered_by;
        self
    }

    /// Adds a runtime abstraction.
    #[must_use]
    pub fn with_abstraction(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.abstractions.insert(key.into(), value.into());
        self
    }
}

/// Whether an execution can be retried, and its retry groups if so.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryInfo {
    /// Whether a retry may be started.
    pub is_resumable: bool,
    /// Why the execution cannot be retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Stage groups of the execution, in execution order.
    #[serde(default)]
    pub groups: Vec<RetryGroup>,
}

impl RetryInfo {
    /// A resumable execution with its groups.
    #[must_use]
    pub fn resumable(groups: Vec<RetryGroup>) -> Self {
        Self {
            is_resumable: true,
            error_message: None,
            groups,
        }
    }

    /// A non-resumable execution.
    #[must_use]
    pub fn not_resumable(message: impl Into<String>) -> Self {
        Self {
            is_resumable: false,
            error_message: Some(message.into()),
            groups: Vec::new(),
        }
    }
}

/// One execution of a retry chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    /// Plan execution id.
    pub uuid: String,
    /// Start time.
    pub start_ts: Option<i64>,
    /// End time.
    pub end_ts: Option<i64>,
    /// Status.
    pub status: ExecutionStatus,
}

/// Every execution of a retry chain, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryHistoryResponse {
    /// Set when the chain has no retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Newest execution of the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_execution_id: Option<String>,
    /// The executions of the chain.
    #[serde(default)]
    pub execution_infos: Vec<ExecutionInfo>,
}

/// The newest execution of a retry chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryLatestExecutionResponse {
    /// Set when the chain has no retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Newest execution of the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_execution_id: Option<String>,
}

/// Everything needed to start a retry execution.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExecutionArgs {
    /// Id of the new execution.
    pub plan_execution_id: String,
    /// Rewritten plan.
    pub plan: Plan,
    /// Metadata of the new execution.
    pub metadata: PlanExecutionMetadata,
    /// Trigger lineage of the new execution.
    pub trigger_info: ExecutionTriggerInfo,
    /// Position of the new execution in its retry chain.
    pub retry_metadata: RetryExecutionMetadata,
    /// Stages resolved to prior results.
    pub skipped_stages: Vec<String>,
    /// Stages that run again.
    pub retry_stages: Vec<String>,
}

/// Result of a started retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    /// Handle of the new execution.
    pub handle: ExecutionHandle,
    /// Stages resolved to prior results.
    pub skipped_stages: Vec<String>,
    /// Stages that run again.
    pub retry_stages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_from_json() {
        let request: RetryRequest = serde_json::from_value(serde_json::json!({
            "pipelineIdentifier": "deploy",
            "previousExecutionId": "e1",
            "retryStages": ["s2"],
            "triggeredBy": {"identifier": "alice"}
        }))
        .unwrap();

        assert!(!request.run_all_stages);
        assert!(request.abstractions.is_empty());
        assert_eq!(request.triggered_by.identifier, "alice");
    }

    #[test]
    fn test_retry_info_serialization_omits_missing_message() {
        let json = serde_json::to_value(RetryInfo::resumable(Vec::new())).unwrap();
        assert_eq!(json, serde_json::json!({"isResumable": true, "groups": []}));

        let json = serde_json::to_value(RetryInfo::not_resumable("nope")).unwrap();
        assert_eq!(json["errorMessage"], "nope");
    }
}
