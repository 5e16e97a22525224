//! Gates deciding whether an execution may be retried.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::request::RetryInfo;
use crate::config::ResumeConfig;
use crate::errors::{Result, RetryError};
use crate::ports::{LedgerStore, PipelineRecord, PipelineStore, PlanExecutionMetadata, SummaryStore};
use crate::retry::{build_retry_index, is_retry_compatible, RetryIndex, INCOMPATIBLE_PIPELINE_MESSAGE};
use crate::summary::PipelineExecutionSummary;
use crate::utils::{is_older_than_days, Timestamp};

/// Message for executions that were rolled back.
pub const ROLLED_BACK_MESSAGE: &str =
    "This execution has undergone Pipeline Rollback, and hence cannot be retried.";
/// Message for executions superseded by a later retry.
pub const NOT_LATEST_MESSAGE: &str = "This execution is not the latest of all retried execution. You can only retry the latest execution.";

/// Message for a pipeline that no longer exists.
#[must_use]
pub fn pipeline_missing_message(pipeline_identifier: &str) -> String {
    format!("Pipeline with the given ID: {pipeline_identifier} does not exist or has been deleted")
}

/// Message for executions past the retention window.
#[must_use]
pub fn retention_message(retention_days: u32) -> String {
    format!("Execution is more than {retention_days} days old. Cannot retry")
}

/// Message for an execution without retained metadata.
#[must_use]
pub fn missing_execution_message(plan_execution_id: &str) -> String {
    format!("No Plan Execution exists for id {plan_execution_id}")
}

/// Snapshot of everything the gates look at.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    /// Execution being retried.
    pub plan_execution_id: &'a str,
    /// Pipeline of the execution.
    pub pipeline_identifier: &'a str,
    /// Summary of the execution, if one was recorded.
    pub summary: Option<&'a PipelineExecutionSummary>,
    /// The stored pipeline, if it still exists.
    pub pipeline: Option<&'a PipelineRecord>,
    /// Retained metadata of the execution.
    pub metadata: Option<&'a PlanExecutionMetadata>,
}

/// Runs the retry gates in order and returns the first failure message.
///
/// The gates are: rollback, latest of chain, pipeline exists, retention
/// window, metadata retained, definition compatible. Summary-based gates
/// pass when no summary was recorded.
#[must_use]
pub fn first_failed_gate(inputs: &GateInputs<'_>, retention_days: u32, now: Timestamp) -> Option<String> {
    if let Some(summary) = inputs.summary {
        if summary.rollback_mode_execution_id.is_some() {
            return Some(ROLLED_BACK_MESSAGE.to_string());
        }
        if !summary.is_latest_execution {
            return Some(NOT_LATEST_MESSAGE.to_string());
        }
    }

    let Some(pipeline) = inputs.pipeline else {
        return Some(pipeline_missing_message(inputs.pipeline_identifier));
    };

    if let Some(summary) = inputs.summary {
        if is_older_than_days(summary.created_at, retention_days, now) {
            return Some(retention_message(retention_days));
        }
    }

    let Some(metadata) = inputs.metadata else {
        return Some(missing_execution_message(inputs.plan_execution_id));
    };

    if !is_retry_compatible(metadata.yaml_for_compatibility(), &pipeline.yaml) {
        return Some(INCOMPATIBLE_PIPELINE_MESSAGE.to_string());
    }

    None
}

/// An execution that passed every gate.
#[derive(Debug, Clone)]
pub struct ValidatedExecution {
    /// Summary of the execution, if one was recorded.
    pub summary: Option<PipelineExecutionSummary>,
    /// The stored pipeline.
    pub pipeline: PipelineRecord,
    /// Retained metadata of the execution.
    pub metadata: PlanExecutionMetadata,
    /// Retry groups of the execution.
    pub index: RetryIndex,
}

/// Loads an execution and runs the retry gates over it.
pub struct RetryValidator {
    config: ResumeConfig,
    pipelines: Arc<dyn PipelineStore>,
    ledger: Arc<dyn LedgerStore>,
    summaries: Arc<dyn SummaryStore>,
}

impl std::fmt::Debug for RetryValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryValidator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryValidator {
    /// Creates a validator.
    #[must_use]
    pub fn new(
        config: ResumeConfig,
        pipelines: Arc<dyn PipelineStore>,
        ledger: Arc<dyn LedgerStore>,
        summaries: Arc<dyn SummaryStore>,
    ) -> Self {
        Self {
            config,
            pipelines,
            ledger,
            summaries,
        }
    }

    /// Reports whether an execution may be retried.
    ///
    /// Failed gates are reported inside the returned [`RetryInfo`].
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::UpstreamUnavailable`] if a store fails.
    pub async fn validate(
        &self,
        pipeline_identifier: &str,
        plan_execution_id: &str,
    ) -> Result<RetryInfo> {
        match self.check(pipeline_identifier, plan_execution_id).await {
            Ok(validated) => Ok(RetryInfo::resumable(validated.index.into_groups())),
            Err(RetryError::NotResumable(info)) => Ok(RetryInfo::not_resumable(info.summary)),
            Err(err) => Err(err),
        }
    }

    /// Loads an execution and requires every gate to pass.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::NotResumable`] carrying the first failed gate's
    /// message, or [`RetryError::UpstreamUnavailable`] if a store fails.
    pub async fn check(
        &self,
        pipeline_identifier: &str,
        plan_execution_id: &str,
    ) -> Result<ValidatedExecution> {
        let (summary, pipeline, metadata, stage_details) = futures::try_join!(
            self.summaries.get(plan_execution_id),
            self.pipelines.get(pipeline_identifier),
            self.ledger.get_execution_metadata(plan_execution_id),
            self.ledger.get_stage_details(plan_execution_id),
        )?;

        let inputs = GateInputs {
            plan_execution_id,
            pipeline_identifier,
            summary: summary.as_ref(),
            pipeline: pipeline.as_ref(),
            metadata: metadata.as_ref(),
        };
        if let Some(message) = first_failed_gate(&inputs, self.config.retention_days, Utc::now()) {
            warn!(
                plan_execution_id,
                pipeline = pipeline_identifier,
                reason = %message,
                "Execution cannot be retried"
            );
            return Err(RetryError::not_resumable(message)
                .with_context("plan_execution_id", plan_execution_id));
        }

        let (Some(pipeline), Some(metadata)) = (pipeline, metadata) else {
            return Err(RetryError::invariant("Retry gates passed without pipeline or metadata"));
        };
        let index = build_retry_index(&stage_details)?;

        debug!(
            plan_execution_id,
            groups = index.len(),
            "Execution passed retry validation"
        );

        Ok(ValidatedExecution {
            summary,
            pipeline,
            metadata,
            index,
        })
    }
}
