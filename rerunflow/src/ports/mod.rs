//! Collaborator interfaces consumed by the retry core.
//!
//! Every piece of I/O the retry core needs (pipeline lookup, the execution
//! ledger, plan compilation, the runtime and the summary read model) is
//! reached through one of the traits below. All of them are object safe and
//! `Send + Sync` so they can be shared as `Arc<dyn Trait>`.
//!
//! In-memory implementations for tests and demos live in
//! [`crate::testing`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::lineage::ExecutionTriggerInfo;
use crate::plan::{Plan, PriorNodeExecution};
use crate::retry::RetryStageInfo;
use crate::summary::{PipelineExecutionSummary, SummaryPatch};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{collaborator} unavailable: {message}")]
pub struct StoreError {
    /// Name of the collaborator that failed (e.g., "ledger").
    pub collaborator: String,
    /// Failure detail.
    pub message: String,
}

impl StoreError {
    /// Creates a new store error.
    #[must_use]
    pub fn new(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// Result alias for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A stored pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRecord {
    /// Pipeline identifier.
    pub identifier: String,
    /// Pipeline YAML as currently authored.
    pub yaml: String,
}

impl PipelineRecord {
    /// Creates a new pipeline record.
    #[must_use]
    pub fn new(identifier: impl Into<String>, yaml: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            yaml: yaml.into(),
        }
    }
}

/// Result of narrowing a definition to a subset of its stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagesExecutionInfo {
    /// Whether only a subset of stages was executed.
    pub is_stages_execution: bool,
    /// The (possibly narrowed) YAML that was run.
    pub pipeline_yaml_to_run: String,
    /// The full pipeline YAML when a subset was run.
    pub full_pipeline_yaml: Option<String>,
    /// Identifiers of the stages that were run.
    pub stage_identifiers: Option<Vec<String>>,
    /// Expression values supplied for the skipped stages.
    pub expression_values: Option<HashMap<String, String>>,
}

/// Retained metadata of a plan execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecutionMetadata {
    /// The plan execution id.
    pub plan_execution_id: String,
    /// Identifier of the pipeline that was executed.
    pub pipeline_identifier: String,
    /// Pipeline YAML as executed.
    pub yaml: String,
    /// Processed YAML (with compiled-tree uuids) as executed.
    pub processed_yaml: String,
    /// Stage subset information, when a subset was executed.
    pub stages_execution_info: Option<StagesExecutionInfo>,
    /// Trigger information of the execution.
    pub trigger_info: Option<ExecutionTriggerInfo>,
    /// Stages that were re-run when this execution was a retry.
    #[serde(default)]
    pub retry_stage_identifiers: Vec<String>,
}

impl PlanExecutionMetadata {
    /// Returns the YAML a retry compatibility check must compare against.
    ///
    /// Selective stage executions record the full pipeline separately.
    #[must_use]
    pub fn yaml_for_compatibility(&self) -> &str {
        match &self.stages_execution_info {
            Some(info) if info.is_stages_execution => {
                info.full_pipeline_yaml.as_deref().unwrap_or(&self.yaml)
            }
            _ => &self.yaml,
        }
    }
}

/// A plan compilation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    /// Id of the execution the plan is compiled for.
    pub plan_execution_id: String,
    /// Processed YAML to compile.
    pub processed_yaml: String,
    /// Metadata of the new execution.
    pub metadata: PlanExecutionMetadata,
}

/// Handle to a started execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    /// The plan execution id.
    pub plan_execution_id: String,
    /// Epoch millis at which the runtime accepted the plan.
    pub started_at: i64,
}

/// Lookup of stored pipeline definitions.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Gets a pipeline by identifier; `None` if missing or deleted.
    async fn get(&self, pipeline_identifier: &str) -> StoreResult<Option<PipelineRecord>>;
}

/// Read access to the execution ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the stage ledger entries of an execution, in execution order.
    async fn get_stage_details(&self, execution_id: &str) -> StoreResult<Vec<RetryStageInfo>>;

    /// Returns the retained metadata of an execution.
    async fn get_execution_metadata(
        &self,
        execution_id: &str,
    ) -> StoreResult<Option<PlanExecutionMetadata>>;

    /// Returns the processed YAML of an execution.
    async fn get_processed_yaml(&self, execution_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .get_execution_metadata(execution_id)
            .await?
            .map(|metadata| metadata.processed_yaml))
    }

    /// Returns the trigger information of an execution.
    async fn get_trigger_info(
        &self,
        execution_id: &str,
    ) -> StoreResult<Option<ExecutionTriggerInfo>> {
        Ok(self
            .get_execution_metadata(execution_id)
            .await?
            .and_then(|metadata| metadata.trigger_info))
    }

    /// Resolves stage identifiers to the stage FQNs recorded for an execution.
    ///
    /// Identifiers without a recorded node execution are absent from the map.
    async fn get_stage_fqns(
        &self,
        execution_id: &str,
        identifiers: &[String],
    ) -> StoreResult<HashMap<String, String>>;

    /// Returns the node executions of an execution belonging to the given stage FQNs.
    async fn get_node_executions(
        &self,
        execution_id: &str,
        stage_fqns: &[String],
    ) -> StoreResult<Vec<PriorNodeExecution>>;
}

/// External plan compiler.
///
/// Compilation is asynchronous: callers submit a request and poll for the
/// compiled plan.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanCompiler: Send + Sync {
    /// Assigns compiled-tree uuids to a pipeline YAML.
    async fn process_yaml(&self, pipeline_yaml: &str) -> StoreResult<String>;

    /// Submits a processed YAML for compilation.
    async fn submit(&self, request: CompileRequest) -> StoreResult<()>;

    /// Returns the compiled plan once it is ready.
    async fn poll(&self, plan_execution_id: &str) -> StoreResult<Option<Plan>>;
}

/// External execution runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Starts executing a plan.
    async fn start(
        &self,
        plan: Plan,
        abstractions: HashMap<String, String>,
        metadata: PlanExecutionMetadata,
    ) -> StoreResult<ExecutionHandle>;
}

/// Persistence of the execution summary read model.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Gets a summary by plan execution id.
    async fn get(&self, plan_execution_id: &str) -> StoreResult<Option<PipelineExecutionSummary>>;

    /// Creates a summary document.
    async fn create(&self, summary: PipelineExecutionSummary) -> StoreResult<()>;

    /// Applies a field-scoped patch atomically to one summary document.
    async fn patch(&self, plan_execution_id: &str, patch: SummaryPatch) -> StoreResult<()>;

    /// Lists every execution of a retry chain, newest first.
    async fn list_by_root_execution(
        &self,
        root_execution_id: &str,
    ) -> StoreResult<Vec<PipelineExecutionSummary>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::new("compiler", "timed out");
        assert_eq!(err.to_string(), "compiler unavailable: timed out");
    }

    #[test]
    fn test_yaml_for_compatibility_prefers_full_yaml() {
        let mut metadata = PlanExecutionMetadata {
            yaml: "narrowed".to_string(),
            ..Default::default()
        };
        assert_eq!(metadata.yaml_for_compatibility(), "narrowed");

        metadata.stages_execution_info = Some(StagesExecutionInfo {
            is_stages_execution: true,
            pipeline_yaml_to_run: "narrowed".to_string(),
            full_pipeline_yaml: Some("full".to_string()),
            ..Default::default()
        });
        assert_eq!(metadata.yaml_for_compatibility(), "full");
    }

    #[tokio::test]
    async fn test_mock_compiler_poll() {
        let mut compiler = MockPlanCompiler::new();
        compiler.expect_poll().returning(|_| Ok(None));

        let polled = compiler.poll("exec-1").await.unwrap();
        assert!(polled.is_none());
    }
}
