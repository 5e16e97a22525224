//! Execution status of pipeline, stage and step nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a node, as recorded by the execution runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Node has not been started.
    #[default]
    NotStarted,
    /// Node is queued for execution.
    Queued,
    /// Node is currently running.
    Running,
    /// Node is waiting on an asynchronous callback.
    AsyncWaiting,
    /// Node is waiting on a manual intervention.
    InterventionWaiting,
    /// Node is waiting on an approval.
    ApprovalWaiting,
    /// Node is waiting on runtime inputs.
    InputWaiting,
    /// Node is waiting on a resource constraint.
    ResourceWaiting,
    /// Node execution is paused.
    Paused,
    /// Node completed successfully.
    Success,
    /// Node failed but its failure was ignored.
    IgnoreFailed,
    /// Node was skipped by a condition.
    Skipped,
    /// Node failed.
    Failed,
    /// Node errored before producing a result.
    Errored,
    /// Node was aborted by a user or a policy.
    Aborted,
    /// Node expired before completing.
    Expired,
    /// Node was an approval that got rejected.
    #[serde(alias = "APPROVALREJECTED")]
    ApprovalRejected,
    /// Node was suspended and will not resume.
    Suspended,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::AsyncWaiting => "ASYNC_WAITING",
            Self::InterventionWaiting => "INTERVENTION_WAITING",
            Self::ApprovalWaiting => "APPROVAL_WAITING",
            Self::InputWaiting => "INPUT_WAITING",
            Self::ResourceWaiting => "RESOURCE_WAITING",
            Self::Paused => "PAUSED",
            Self::Success => "SUCCESS",
            Self::IgnoreFailed => "IGNORE_FAILED",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
            Self::Errored => "ERRORED",
            Self::Aborted => "ABORTED",
            Self::Expired => "EXPIRED",
            Self::ApprovalRejected => "APPROVAL_REJECTED",
            Self::Suspended => "SUSPENDED",
        };
        write!(f, "{name}")
    }
}

impl ExecutionStatus {
    /// Returns true if the status will not change any more.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success
                | Self::IgnoreFailed
                | Self::Skipped
                | Self::Failed
                | Self::Errored
                | Self::Aborted
                | Self::Expired
                | Self::ApprovalRejected
                | Self::Suspended
        )
    }

    /// Returns true for the terminal failure kinds a retry may re-run.
    ///
    /// Only `Aborted`, `Failed`, `Expired` and `ApprovalRejected` qualify;
    /// `IgnoreFailed` counts as a pass.
    #[must_use]
    pub fn is_retryable_failure(&self) -> bool {
        matches!(
            self,
            Self::Aborted | Self::Failed | Self::Expired | Self::ApprovalRejected
        )
    }

    /// Returns true if the status should carry failure details in summaries.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Errored | Self::Aborted | Self::Expired | Self::ApprovalRejected
        )
    }

    /// Returns true if the status counts as a positive outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::IgnoreFailed | Self::Skipped)
    }
}
