//! Listing of retry chains.

use tracing::debug;

use super::request::{ExecutionInfo, RetryHistoryResponse, RetryLatestExecutionResponse};
use crate::errors::Result;
use crate::ports::SummaryStore;

/// Message for chains consisting of a single execution.
pub const NOT_RETRIED_MESSAGE: &str =
    "This execution has not been retried. Retry history is available only for retried executions.";

/// Message for an execution outside the requested chain.
#[must_use]
pub fn outside_chain_message(plan_execution_id: &str, root_execution_id: &str) -> String {
    format!("Execution {plan_execution_id} is not part of the retry chain of {root_execution_id}")
}

/// Lists every execution of the retry chain rooted at `root_execution_id`.
///
/// A chain without retries, or one that does not contain
/// `plan_execution_id`, yields a response carrying an error message.
///
/// # Errors
///
/// Returns [`crate::errors::RetryError::UpstreamUnavailable`] if the summary
/// store fails.
pub async fn retry_history(
    summaries: &dyn SummaryStore,
    root_execution_id: &str,
    plan_execution_id: &str,
) -> Result<RetryHistoryResponse> {
    let chain = summaries.list_by_root_execution(root_execution_id).await?;
    debug!(root_execution_id, executions = chain.len(), "Loaded retry chain");

    if chain.len() <= 1 {
        return Ok(RetryHistoryResponse {
            error_message: Some(NOT_RETRIED_MESSAGE.to_string()),
            ..RetryHistoryResponse::default()
        });
    }
    if !chain.iter().any(|s| s.plan_execution_id == plan_execution_id) {
        return Ok(RetryHistoryResponse {
            error_message: Some(outside_chain_message(plan_execution_id, root_execution_id)),
            ..RetryHistoryResponse::default()
        });
    }

    let execution_infos: Vec<ExecutionInfo> = chain
        .into_iter()
        .map(|summary| ExecutionInfo {
            uuid: summary.plan_execution_id,
            start_ts: summary.start_ts,
            end_ts: summary.end_ts,
            status: summary.status,
        })
        .collect();

    Ok(RetryHistoryResponse {
        error_message: None,
        latest_execution_id: execution_infos.first().map(|info| info.uuid.clone()),
        execution_infos,
    })
}

/// Returns the newest execution of the retry chain rooted at `root_execution_id`.
///
/// # Errors
///
/// Returns [`crate::errors::RetryError::UpstreamUnavailable`] if the summary
/// store fails.
pub async fn retry_latest_execution(
    summaries: &dyn SummaryStore,
    root_execution_id: &str,
) -> Result<RetryLatestExecutionResponse> {
    let chain = summaries.list_by_root_execution(root_execution_id).await?;
    if chain.len() <= 1 {
        return Ok(RetryLatestExecutionResponse {
            error_message: Some(NOT_RETRIED_MESSAGE.to_string()),
            latest_execution_id: None,
        });
    }
    Ok(RetryLatestExecutionResponse {
        error_message: None,
        latest_execution_id: chain.into_iter().next().map(|s| s.plan_execution_id),
    })
}
