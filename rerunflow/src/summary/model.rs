//! The pipeline execution summary read model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::ExecutionStatus;
use crate::lineage::{ExecutionTriggerInfo, RetryExecutionMetadata};
use crate::utils::now_millis;

/// Failure details of a stage or step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    /// Human readable failure message.
    pub message: String,
    /// Failure classifications (e.g., "TIMEOUT_ERROR").
    #[serde(default)]
    pub failure_types: Vec<String>,
}

impl FailureInfo {
    /// Creates failure info with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            failure_types: Vec::new(),
        }
    }

    /// Adds a failure type.
    #[must_use]
    pub fn with_failure_type(mut self, failure_type: impl Into<String>) -> Self {
        self.failure_types.push(failure_type.into());
        self
    }
}

/// Why a stage was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipInfo {
    /// The skip condition expression.
    pub skip_condition: String,
    /// Whether the condition evaluated to true.
    pub evaluated_condition: bool,
}

/// Pipeline-level error details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorInfo {
    /// Error message.
    pub message: String,
}

/// Display state of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageLayoutEntry {
    /// Stage identifier.
    pub node_identifier: String,
    /// Stage status.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Epoch millis the stage started.
    #[serde(default)]
    pub start_ts: Option<i64>,
    /// Epoch millis the stage ended.
    #[serde(default)]
    pub end_ts: Option<i64>,
    /// Failure details.
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    /// Skip details.
    #[serde(default)]
    pub skip_info: Option<SkipInfo>,
    /// Whether a barrier step ran inside the stage.
    #[serde(default)]
    pub barrier_found: bool,
    /// Latest node execution of the stage.
    #[serde(default)]
    pub node_execution_id: Option<String>,
}

impl StageLayoutEntry {
    /// Creates a not-started layout entry.
    #[must_use]
    pub fn new(node_identifier: impl Into<String>) -> Self {
        Self {
            node_identifier: node_identifier.into(),
            ..Self::default()
        }
    }
}

/// Denormalized summary of one plan execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecutionSummary {
    /// The plan execution id.
    pub plan_execution_id: String,
    /// Pipeline identifier.
    pub pipeline_identifier: String,
    /// Pipeline status.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Epoch millis the pipeline started.
    #[serde(default)]
    pub start_ts: Option<i64>,
    /// Epoch millis the pipeline ended.
    #[serde(default)]
    pub end_ts: Option<i64>,
    /// Pipeline-level error details.
    #[serde(default)]
    pub execution_error_info: Option<ExecutionErrorInfo>,
    /// Stage layout entries keyed by stage node uuid.
    #[serde(default)]
    pub layout_node_map: HashMap<String, StageLayoutEntry>,
    /// Whether this is the newest execution of its retry chain.
    #[serde(default = "default_true")]
    pub is_latest_execution: bool,
    /// Epoch millis the summary was created.
    pub created_at: i64,
    /// Retry chain position, present for retries.
    #[serde(default)]
    pub retry_execution_metadata: Option<RetryExecutionMetadata>,
    /// Id of the rollback execution, if the pipeline was rolled back.
    #[serde(default)]
    pub rollback_mode_execution_id: Option<String>,
    /// Trigger information.
    #[serde(default)]
    pub execution_trigger_info: Option<ExecutionTriggerInfo>,
}

fn default_true() -> bool {
    true
}

impl PipelineExecutionSummary {
    /// Creates a running summary created now.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>, pipeline_identifier: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            pipeline_identifier: pipeline_identifier.into(),
            status: ExecutionStatus::Running,
            start_ts: None,
            end_ts: None,
            execution_error_info: None,
            layout_node_map: HashMap::new(),
            is_latest_execution: true,
            created_at: now_millis(),
            retry_execution_metadata: None,
            rollback_mode_execution_id: None,
            execution_trigger_info: None,
        }
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets start and end time.
    #[must_use]
    pub fn with_times(mut self, start_ts: i64, end_ts: Option<i64>) -> Self {
        self.start_ts = Some(start_ts);
        self.end_ts = end_ts;
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    /// Adds a stage layout entry.
    #[must_use]
    pub fn with_layout_entry(mut self, node_uuid: impl Into<String>, entry: StageLayoutEntry) -> Self {
        self.layout_node_map.insert(node_uuid.into(), entry);
        self
    }

    /// Sets the retry chain position.
    #[must_use]
    pub fn with_retry_metadata(mut self, metadata: RetryExecutionMetadata) -> Self {
        self.retry_execution_metadata = Some(metadata);
        self
    }

    /// Marks the execution as rolled back.
    #[must_use]
    pub fn with_rollback_mode_execution_id(mut self, id: impl Into<String>) -> Self {
        self.rollback_mode_execution_id = Some(id.into());
        self
    }

    /// Sets whether this is the newest execution of its chain.
    #[must_use]
    pub fn with_latest(mut self, is_latest_execution: bool) -> Self {
        self.is_latest_execution = is_latest_execution;
        self
    }

    /// Sets the trigger info.
    #[must_use]
    pub fn with_trigger_info(mut self, info: ExecutionTriggerInfo) -> Self {
        self.execution_trigger_info = Some(info);
        self
    }

    /// Returns the root of this execution's retry chain.
    #[must_use]
    pub fn root_execution_id(&self) -> &str {
        self.retry_execution_metadata
            .as_ref()
            .map_or(&self.plan_execution_id, |meta| &meta.root_execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_document() {
        let summary = PipelineExecutionSummary::new("exec-1", "deploy")
            .with_created_at(5)
            .with_layout_entry("u-build", StageLayoutEntry::new("build"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["planExecutionId"], "exec-1");
        assert_eq!(json["isLatestExecution"], true);
        assert_eq!(json["layoutNodeMap"]["u-build"]["nodeIdentifier"], "build");
        assert_eq!(json["layoutNodeMap"]["u-build"]["status"], "NOT_STARTED");
        assert_eq!(json["layoutNodeMap"]["u-build"]["barrierFound"], false);
    }

    #[test]
    fn test_root_execution_id() {
        let summary = PipelineExecutionSummary::new("exec-2", "deploy");
        assert_eq!(summary.root_execution_id(), "exec-2");

        let retried = summary.with_retry_metadata(RetryExecutionMetadata {
            root_execution_id: "exec-1".to_string(),
            parent_execution_id: "exec-1".to_string(),
        });
        assert_eq!(retried.root_execution_id(), "exec-1");
    }

    #[test]
    fn test_missing_latest_flag_defaults_true() {
        let summary: PipelineExecutionSummary = serde_json::from_value(serde_json::json!({
            "planExecutionId": "e",
            "pipelineIdentifier": "p",
            "createdAt": 1
        }))
        .unwrap();
        assert!(summary.is_latest_execution);
        assert_eq!(summary.status, ExecutionStatus::NotStarted);
    }
}
