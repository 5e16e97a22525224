//! Rewrites a freshly compiled plan so skipped stages resolve to prior results.
//!
//! [`transform_plan`] is the pure core; [`PlanTransformer`] resolves the
//! inputs it needs from the ledger.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::graph::Plan;
use super::node::{IdentityPlanNode, Node};
use crate::core::StepType;
use crate::errors::{Result, RetryError};
use crate::ports::LedgerStore;

/// A node execution recorded by a prior run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorNodeExecution {
    /// Id of the node execution.
    pub node_execution_id: String,
    /// Uuid of the plan node that was executed.
    pub plan_node_uuid: String,
    /// FQN of the owning stage.
    pub stage_fqn: String,
    /// Step type of the executed node.
    pub step_type: StepType,
}

impl PriorNodeExecution {
    /// Creates a prior node execution record.
    #[must_use]
    pub fn new(
        node_execution_id: impl Into<String>,
        plan_node_uuid: impl Into<String>,
        stage_fqn: impl Into<String>,
        step_type: StepType,
    ) -> Self {
        Self {
            node_execution_id: node_execution_id.into(),
            plan_node_uuid: plan_node_uuid.into(),
            stage_fqn: stage_fqn.into(),
            step_type,
        }
    }
}

/// Ledger data resolved for a plan rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipResolution {
    /// FQNs of the skipped stages.
    pub skipped_stage_fqns: Vec<String>,
    /// Prior node executions of the skipped stages.
    pub skipped_executions: Vec<PriorNodeExecution>,
    /// Prior strategy node executions of the retried stages.
    pub retried_strategy_executions: Vec<PriorNodeExecution>,
}

/// Replaces nodes of skipped stages with identity nodes.
///
/// Each prior node execution of a skipped stage is matched to the new plan
/// node with the same uuid; that node becomes an [`IdentityPlanNode`] pointing
/// at the prior execution. Prior strategy executions of retried stages turn
/// their strategy node into an identity node that keeps following its
/// advisers. Every other node, and every plan-level field, is carried over
/// unchanged; the node count never changes.
///
/// # Errors
///
/// Returns [`RetryError::Invariant`] if a skipped stage FQN has no node in
/// the plan, or if a matched node's stage FQN differs from the prior one.
pub fn transform_plan(plan: &Plan, resolution: &SkipResolution) -> Result<Plan> {
    for fqn in &resolution.skipped_stage_fqns {
        if !plan.has_stage_fqn(fqn) {
            error!(stage_fqn = %fqn, plan = %plan.uuid, "Skipped stage missing from compiled plan");
            return Err(RetryError::invariant(format!(
                "Skipped stage {fqn} has no node in the compiled plan"
            ))
            .with_context("stage_fqn", fqn.as_str()));
        }
    }

    let skipped: HashSet<&str> = resolution
        .skipped_stage_fqns
        .iter()
        .map(String::as_str)
        .collect();

    let mut rewritten = plan.clone();
    let mut replaced = 0_usize;

    let skipped_priors = resolution
        .skipped_executions
        .iter()
        .filter(|prior| skipped.contains(prior.stage_fqn.as_str()))
        .map(|prior| (prior, false));
    let strategy_priors = resolution
        .retried_strategy_executions
        .iter()
        .filter(|prior| prior.step_type.is_strategy())
        .map(|prior| (prior, true));

    for (prior, use_advisers) in skipped_priors.chain(strategy_priors) {
        let Some(id) = plan.node_id(&prior.plan_node_uuid) else {
            debug!(
                node_execution_id = %prior.node_execution_id,
                plan_node_uuid = %prior.plan_node_uuid,
                "Prior node execution has no counterpart in the new plan"
            );
            continue;
        };
        let Some(Node::Plan(node)) = rewritten.node(id) else {
            continue;
        };

        if node.stage_fqn != prior.stage_fqn {
            error!(
                plan_node_uuid = %node.uuid,
                plan_stage_fqn = %node.stage_fqn,
                prior_stage_fqn = %prior.stage_fqn,
                "Prior node execution matched a node of another stage"
            );
            return Err(RetryError::invariant(format!(
                "Node {} belongs to {} but its prior execution to {}",
                node.uuid, node.stage_fqn, prior.stage_fqn
            ))
            .with_context("plan_node_uuid", node.uuid.as_str()));
        }

        let identity = IdentityPlanNode::from_plan_node(node, prior.node_execution_id.as_str())
            .with_use_adviser_obtainments(use_advisers);
        rewritten.replace_node(id, Node::Identity(identity));
        replaced += 1;
    }

    debug!(
        plan = %plan.uuid,
        node_count = rewritten.len(),
        identity_nodes = replaced,
        "Transformed plan for retry"
    );

    Ok(rewritten)
}

/// Resolves ledger data and rewrites compiled plans for retry.
pub struct PlanTransformer {
    ledger: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for PlanTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanTransformer").finish_non_exhaustive()
    }
}

impl PlanTransformer {
    /// Creates a transformer over `ledger`.
    #[must_use]
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Resolves the ledger data needed to rewrite a plan.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::UpstreamUnavailable`] if the ledger fails and
    /// [`RetryError::Invariant`] if a skipped stage has no recorded FQN.
    pub async fn resolve(
        &self,
        previous_execution_id: &str,
        skipped_identifiers: &[String],
        retried_identifiers: &[String],
    ) -> Result<SkipResolution> {
        let (skipped_fqns, retried_fqns) = futures::try_join!(
            self.ledger
                .get_stage_fqns(previous_execution_id, skipped_identifiers),
            self.ledger
                .get_stage_fqns(previous_execution_id, retried_identifiers),
        )?;

        let mut skipped_stage_fqns = Vec::with_capacity(skipped_identifiers.len());
        for identifier in skipped_identifiers {
            let fqn = skipped_fqns.get(identifier).ok_or_else(|| {
                error!(stage = %identifier, "Skipped stage has no recorded FQN");
                RetryError::invariant(format!("Skipped stage {identifier} has no recorded FQN"))
                    .with_context("stage", identifier.as_str())
            })?;
            skipped_stage_fqns.push(fqn.clone());
        }
        let retried_stage_fqns: Vec<String> = retried_identifiers
            .iter()
            .filter_map(|identifier| retried_fqns.get(identifier).cloned())
            .collect();

        let (skipped_executions, retried_executions) = futures::try_join!(
            self.ledger
                .get_node_executions(previous_execution_id, &skipped_stage_fqns),
            self.ledger
                .get_node_executions(previous_execution_id, &retried_stage_fqns),
        )?;

        let retried_strategy_executions = retried_executions
            .into_iter()
            .filter(|prior| prior.step_type.is_strategy())
            .collect();

        Ok(SkipResolution {
            skipped_stage_fqns,
            skipped_executions,
            retried_strategy_executions,
        })
    }

    /// Rewrites `plan` so the skipped stages resolve to the prior execution.
    ///
    /// # Errors
    ///
    /// See [`PlanTransformer::resolve`] and [`transform_plan`].
    pub async fn rewrite(
        &self,
        plan: &Plan,
        skipped_identifiers: &[String],
        retried_identifiers: &[String],
        previous_execution_id: &str,
    ) -> Result<Plan> {
        let resolution = self
            .resolve(previous_execution_id, skipped_identifiers, retried_identifiers)
            .await?;
        let rewritten = transform_plan(plan, &resolution)?;

        info!(
            previous_execution_id,
            skipped = skipped_identifiers.len(),
            identity_nodes = rewritten.identity_count(),
            "Rewrote plan for retry"
        );

        Ok(rewritten)
    }
}
