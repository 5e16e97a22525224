//! Trigger lineage of executions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::{Result, RetryError};
use crate::ports::LedgerStore;

/// How an execution was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    /// Started by a user.
    #[default]
    Manual,
    /// Started by a git webhook.
    Webhook,
    /// Started by a custom webhook.
    WebhookCustom,
    /// Started by a cron schedule.
    SchedulerCron,
    /// Started by a new artifact.
    Artifact,
    /// Started by a new manifest.
    Manifest,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manual => "MANUAL",
            Self::Webhook => "WEBHOOK",
            Self::WebhookCustom => "WEBHOOK_CUSTOM",
            Self::SchedulerCron => "SCHEDULER_CRON",
            Self::Artifact => "ARTIFACT",
            Self::Manifest => "MANIFEST",
        };
        write!(f, "{name}")
    }
}

/// The principal that started an execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredBy {
    /// Principal uuid.
    #[serde(default)]
    pub uuid: String,
    /// Principal identifier (user name or trigger identifier).
    pub identifier: String,
    /// Additional principal details (e.g., email).
    #[serde(default)]
    pub extra_info: HashMap<String, String>,
}

impl TriggeredBy {
    /// Creates a principal.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Sets the principal uuid.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = uuid.into();
        self
    }

    /// Adds an extra info entry.
    #[must_use]
    pub fn with_extra_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_info.insert(key.into(), value.into());
        self
    }
}

/// Links a rerun to its predecessor and to the root of its chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RerunInfo {
    /// Immediate predecessor.
    pub prev_execution_id: String,
    /// Trigger type of the predecessor.
    pub prev_trigger_type: TriggerType,
    /// First non-rerun execution of the chain.
    pub root_execution_id: String,
    /// Trigger type of the root.
    pub root_trigger_type: TriggerType,
}

/// Trigger information attached to every execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTriggerInfo {
    /// How the execution was started.
    pub trigger_type: TriggerType,
    /// Who started it.
    pub triggered_by: TriggeredBy,
    /// Whether it reruns an earlier execution.
    #[serde(default)]
    pub is_rerun: bool,
    /// Rerun lineage, present for reruns.
    #[serde(default)]
    pub rerun_info: Option<RerunInfo>,
}

impl ExecutionTriggerInfo {
    /// Creates trigger info for a fresh (non-rerun) execution.
    #[must_use]
    pub fn new(trigger_type: TriggerType, triggered_by: TriggeredBy) -> Self {
        Self {
            trigger_type,
            triggered_by,
            is_rerun: false,
            rerun_info: None,
        }
    }
}

/// A predecessor execution and its trigger info.
#[derive(Debug, Clone, Copy)]
pub struct PreviousExecution<'a> {
    /// Id of the predecessor.
    pub execution_id: &'a str,
    /// Trigger info of the predecessor.
    pub trigger_info: &'a ExecutionTriggerInfo,
}

/// Builds trigger info for a new execution.
///
/// Without a predecessor the result is a manual, non-rerun trigger. With
/// one, the result is a manual rerun whose root is the predecessor's root
/// when the predecessor was itself a rerun, and the predecessor otherwise.
/// The predecessor is only read.
#[must_use]
pub fn build_trigger_info(
    previous: Option<PreviousExecution<'_>>,
    triggered_by: TriggeredBy,
) -> ExecutionTriggerInfo {
    let Some(previous) = previous else {
        return ExecutionTriggerInfo::new(TriggerType::Manual, triggered_by);
    };

    let prev_trigger_type = previous.trigger_info.trigger_type;
    let (root_execution_id, root_trigger_type) = match (
        previous.trigger_info.is_rerun,
        &previous.trigger_info.rerun_info,
    ) {
        (true, Some(rerun)) => (rerun.root_execution_id.clone(), rerun.root_trigger_type),
        (true, None) => {
            warn!(
                execution_id = %previous.execution_id,
                "Rerun predecessor has no rerun info; treating it as the root"
            );
            (previous.execution_id.to_string(), prev_trigger_type)
        }
        (false, _) => (previous.execution_id.to_string(), prev_trigger_type),
    };

    ExecutionTriggerInfo {
        trigger_type: TriggerType::Manual,
        triggered_by,
        is_rerun: true,
        rerun_info: Some(RerunInfo {
            prev_execution_id: previous.execution_id.to_string(),
            prev_trigger_type,
            root_execution_id,
            root_trigger_type,
        }),
    }
}

/// Builds trigger lineage by fetching the predecessor from the ledger.
pub struct TriggerLineageBuilder {
    ledger: Arc<dyn LedgerStore>,
}

impl fmt::Debug for TriggerLineageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerLineageBuilder").finish_non_exhaustive()
    }
}

impl TriggerLineageBuilder {
    /// Creates a lineage builder over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Builds trigger info for an execution rerunning `previous_execution_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidRequest`] if the predecessor has no
    /// recorded trigger info and [`RetryError::UpstreamUnavailable`] if the
    /// ledger fails.
    pub async fn build(
        &self,
        previous_execution_id: Option<&str>,
        triggered_by: TriggeredBy,
    ) -> Result<ExecutionTriggerInfo> {
        let Some(execution_id) = previous_execution_id else {
            return Ok(build_trigger_info(None, triggered_by));
        };

        let trigger_info = self
            .ledger
            .get_trigger_info(execution_id)
            .await?
            .ok_or_else(|| {
                RetryError::invalid_request(format!("No Plan Execution exists for id {execution_id}"))
            })?;

        let built = build_trigger_info(
            Some(PreviousExecution {
                execution_id,
                trigger_info: &trigger_info,
            }),
            triggered_by,
        );

        debug!(
            previous_execution_id = %execution_id,
            root_execution_id = ?built.rerun_info.as_ref().map(|r| r.root_execution_id.as_str()),
            "Built rerun trigger info"
        );

        Ok(built)
    }
}
