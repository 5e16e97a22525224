//! Lineage of executions: trigger lineage and retry chains.
//!
//! Trigger lineage links every rerun to its predecessor and to the first
//! non-rerun execution. Retry chains group the executions produced by
//! retrying one another under a shared root.

mod trigger;

use serde::{Deserialize, Serialize};

pub use trigger::{
    build_trigger_info, ExecutionTriggerInfo, PreviousExecution, RerunInfo, TriggerLineageBuilder,
    TriggerType, TriggeredBy,
};

/// Position of an execution in its retry chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryExecutionMetadata {
    /// First execution of the chain.
    pub root_execution_id: String,
    /// Execution this one retried.
    pub parent_execution_id: String,
}

impl RetryExecutionMetadata {
    /// Metadata for an execution retrying `parent_execution_id`.
    ///
    /// The root is inherited from the parent's own metadata, or is the parent
    /// itself when the parent was not a retry.
    #[must_use]
    pub fn following(parent_execution_id: &str, parent: Option<&Self>) -> Self {
        let root_execution_id = parent.map_or_else(
            || parent_execution_id.to_string(),
            |meta| meta.root_execution_id.clone(),
        );
        Self {
            root_execution_id,
            parent_execution_id: parent_execution_id.to_string(),
        }
    }
}
