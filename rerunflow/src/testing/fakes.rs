//! Fake plan compiler and runtime.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::{StepCategory, StepType};
use crate::definition::{keys, Fqn, PipelineDefinition, StageEntry, StageNode};
use crate::plan::{AdviserObtainment, Node, NodeId, Plan, PlanNode};
use crate::ports::{
    CompileRequest, ExecutionHandle, PlanCompiler, PlanExecutionMetadata, Runtime, StoreError,
    StoreResult,
};
use crate::summary::groups;
use crate::utils::{generate_uuid, now_millis};

/// Step type given to stage nodes by [`YamlPlanCompiler`].
pub const STAGE_STEP_TYPE: &str = "DEPLOYMENT";

/// Uuid of the strategy node compiled for a stage.
#[must_use]
pub fn strategy_uuid(stage_uuid: &str) -> String {
    format!("{stage_uuid}-strategy")
}

/// Plan compiler that derives plans straight from the processed YAML.
///
/// Each stage compiles to a strategy node wrapping a stage node; both carry
/// the stage FQN. Node uuids come from the stage `__uuid` fields, so stages
/// that keep their uuid across processing keep their plan nodes too.
#[derive(Debug, Default)]
pub struct YamlPlanCompiler {
    requests: DashMap<String, CompileRequest>,
    polls_before_ready: AtomicUsize,
    never_ready: AtomicBool,
}

impl YamlPlanCompiler {
    /// Creates a compiler whose plans are ready on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every submission need `polls` empty polls before it is ready.
    #[must_use]
    pub fn with_polls_before_ready(self, polls: usize) -> Self {
        self.polls_before_ready.store(polls, Ordering::SeqCst);
        self
    }

    /// Makes polls never return a plan.
    #[must_use]
    pub fn never_ready(self) -> Self {
        self.never_ready.store(true, Ordering::SeqCst);
        self
    }

    /// Returns the request submitted for an execution.
    #[must_use]
    pub fn submitted(&self, plan_execution_id: &str) -> Option<CompileRequest> {
        self.requests
            .get(plan_execution_id)
            .map(|entry| entry.value().clone())
    }

    /// Compiles a processed YAML into a plan.
    ///
    /// # Errors
    ///
    /// Fails if the YAML does not parse or a stage has no `__uuid`.
    pub fn compile(processed_yaml: &str) -> StoreResult<Plan> {
        let definition = PipelineDefinition::parse(processed_yaml)
            .map_err(|e| StoreError::new("compiler", e.to_string()))?;

        let mut plan = Plan::new(generate_uuid().to_string());
        let mut strategy_ids = Vec::new();
        for entry in definition.entries() {
            let members: Vec<&StageNode> = match entry {
                StageEntry::Stage(stage) => vec![stage],
                StageEntry::Parallel(group) => group.members.iter().collect(),
            };
            for stage in members {
                strategy_ids.push(push_stage(&mut plan, stage)?);
            }
        }

        let pipeline_identifier = definition
            .root()
            .get(keys::PIPELINE)
            .and_then(|p| p.get(keys::IDENTIFIER))
            .and_then(|v| v.as_str())
            .unwrap_or("pipeline")
            .to_string();
        let root = plan.push(Node::Plan(
            PlanNode::new(
                generate_uuid().to_string(),
                pipeline_identifier,
                StepType::new("PIPELINE", StepCategory::Pipeline),
            )
            .with_group(groups::PIPELINE)
            .with_children(strategy_ids),
        ));

        Ok(plan.with_starting_node(root))
    }
}

fn push_stage(plan: &mut Plan, stage: &StageNode) -> StoreResult<NodeId> {
    let uuid = stage.uuid.as_deref().ok_or_else(|| {
        StoreError::new(
            "compiler",
            format!("stage {} has no uuid; was the YAML processed?", stage.identifier),
        )
    })?;
    let stage_fqn = Fqn::for_stage(&stage.identifier).to_string();
    let name = stage.name.clone().unwrap_or_else(|| stage.identifier.clone());

    let stage_id = plan.push(Node::Plan(
        PlanNode::new(uuid, stage.identifier.as_str(), StepType::new(STAGE_STEP_TYPE, StepCategory::Stage))
            .with_name(name.as_str())
            .with_group(groups::STAGE)
            .with_stage_fqn(stage_fqn.as_str()),
    ));
    Ok(plan.push(Node::Plan(
        PlanNode::new(strategy_uuid(uuid), stage.identifier.as_str(), StepType::strategy())
            .with_name(name)
            .with_stage_fqn(stage_fqn)
            .with_children(vec![stage_id])
            .with_adviser(AdviserObtainment::new("NEXT_STAGE")),
    )))
}

fn assign_uuid(stage: &StageNode) -> StageNode {
    match stage.uuid {
        Some(_) => stage.clone(),
        None => stage.with_uuid(Some(&generate_uuid().to_string())),
    }
}

#[async_trait]
impl PlanCompiler for YamlPlanCompiler {
    async fn process_yaml(&self, pipeline_yaml: &str) -> StoreResult<String> {
        let definition = PipelineDefinition::parse(pipeline_yaml)
            .map_err(|e| StoreError::new("compiler", e.to_string()))?;

        let entries = definition
            .entries()
            .iter()
            .map(|entry| match entry {
                StageEntry::Stage(stage) => StageEntry::Stage(assign_uuid(stage)),
                StageEntry::Parallel(group) => {
                    let members = group.members.iter().map(assign_uuid).collect();
                    let uuid = group
                        .uuid
                        .clone()
                        .unwrap_or_else(|| generate_uuid().to_string());
                    StageEntry::Parallel(group.rebuild(members, Some(&uuid)))
                }
            })
            .collect();

        definition
            .with_entries(entries)
            .to_yaml()
            .map_err(|e| StoreError::new("compiler", e.to_string()))
    }

    async fn submit(&self, request: CompileRequest) -> StoreResult<()> {
        self.requests
            .insert(request.plan_execution_id.clone(), request);
        Ok(())
    }

    async fn poll(&self, plan_execution_id: &str) -> StoreResult<Option<Plan>> {
        let Some(request) = self.submitted(plan_execution_id) else {
            return Err(StoreError::new(
                "compiler",
                format!("nothing submitted for {plan_execution_id}"),
            ));
        };
        if self.never_ready.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let pending = self
            .polls_before_ready
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Ok(None);
        }
        Self::compile(&request.processed_yaml).map(Some)
    }
}

/// One call to [`RecordingRuntime::start`].
#[derive(Debug, Clone)]
pub struct StartedExecution {
    /// The started plan.
    pub plan: Plan,
    /// Abstractions passed along.
    pub abstractions: HashMap<String, String>,
    /// Metadata of the execution.
    pub metadata: PlanExecutionMetadata,
}

/// Runtime that records started executions instead of running them.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    started: Mutex<Vec<StartedExecution>>,
    unavailable: AtomicBool,
}

impl RecordingRuntime {
    /// Creates a runtime with no recorded executions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every started execution, oldest first.
    #[must_use]
    pub fn started(&self) -> Vec<StartedExecution> {
        self.started.lock().clone()
    }

    /// Makes `start` fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Runtime for RecordingRuntime {
    async fn start(
        &self,
        plan: Plan,
        abstractions: HashMap<String, String>,
        metadata: PlanExecutionMetadata,
    ) -> StoreResult<ExecutionHandle> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new("runtime", "runtime rejected the plan"));
        }
        let handle = ExecutionHandle {
            plan_execution_id: metadata.plan_execution_id.clone(),
            started_at: now_millis(),
        };
        self.started.lock().push(StartedExecution {
            plan,
            abstractions,
            metadata,
        });
        Ok(handle)
    }
}
