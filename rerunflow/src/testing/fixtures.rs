//! Pipeline and execution fixtures.

use std::sync::Arc;

use super::fakes::{strategy_uuid, RecordingRuntime, YamlPlanCompiler, STAGE_STEP_TYPE};
use super::stores::{InMemoryLedgerStore, InMemoryPipelineStore, InMemorySummaryStore};
use crate::core::{ExecutionStatus, StepCategory, StepType};
use crate::definition::{Fqn, PipelineDefinition, StageEntry};
use crate::events::CollectingEventSink;
use crate::lineage::{ExecutionTriggerInfo, TriggerType, TriggeredBy};
use crate::plan::PriorNodeExecution;
use crate::ports::{
    PipelineRecord, PlanCompiler, PlanExecutionMetadata, StagesExecutionInfo, StoreError,
    StoreResult, SummaryStore,
};
use crate::retry::RetryStageInfo;
use crate::service::{RetryCollaborators, RetryExecutionService};
use crate::summary::{PipelineExecutionSummary, StageLayoutEntry};
use crate::utils::now_millis;

/// Renders a pipeline YAML from a stage layout.
///
/// Each inner slice is one top-level entry: a single identifier is a stage,
/// several identifiers form a parallel group.
#[must_use]
pub fn pipeline_yaml(identifier: &str, layout: &[&[&str]]) -> String {
    let mut yaml = format!("pipeline:\n  identifier: {identifier}\n  name: {identifier}\n  stages:\n");
    for entry in layout {
        match entry {
            [stage] => yaml.push_str(&stage_yaml(stage, "    ")),
            members => {
                yaml.push_str("    - parallel:\n");
                for member in *members {
                    yaml.push_str(&stage_yaml(member, "        "));
                }
            }
        }
    }
    yaml
}

fn stage_yaml(identifier: &str, indent: &str) -> String {
    format!(
        "{indent}- stage:\n\
         {indent}    identifier: {identifier}\n\
         {indent}    name: {identifier}\n\
         {indent}    type: Deployment\n\
         {indent}    spec:\n\
         {indent}      execution:\n\
         {indent}        steps:\n\
         {indent}          - step:\n\
         {indent}              identifier: run\n\
         {indent}              type: ShellScript\n"
    )
}

/// Builds the stage ledger of an execution of `layout`.
///
/// Stages missing from `statuses` are recorded as not started.
#[must_use]
pub fn stage_ledger(layout: &[&[&str]], statuses: &[(&str, ExecutionStatus)]) -> Vec<RetryStageInfo> {
    let status_of = |id: &str| {
        statuses
            .iter()
            .find(|(stage, _)| *stage == id)
            .map_or(ExecutionStatus::NotStarted, |(_, status)| *status)
    };

    let mut ledger = Vec::new();
    for (position, entry) in layout.iter().enumerate() {
        let next_id = layout
            .get(position + 1)
            .and_then(|next| next.first())
            .copied()
            .unwrap_or_default();
        for stage in *entry {
            ledger.push(RetryStageInfo::new(*stage, status_of(*stage)).with_next_id(next_id));
        }
    }
    ledger
}

/// A full set of in-memory collaborators.
#[derive(Debug, Default)]
pub struct RetryFixture {
    /// Pipeline store.
    pub pipelines: Arc<InMemoryPipelineStore>,
    /// Execution ledger.
    pub ledger: Arc<InMemoryLedgerStore>,
    /// Plan compiler.
    pub compiler: Arc<YamlPlanCompiler>,
    /// Runtime.
    pub runtime: Arc<RecordingRuntime>,
    /// Summary store.
    pub summaries: Arc<InMemorySummaryStore>,
    /// Collected lifecycle events.
    pub events: Arc<CollectingEventSink>,
}

impl RetryFixture {
    /// Creates a fixture with empty collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the plan compiler.
    #[must_use]
    pub fn with_compiler(mut self, compiler: YamlPlanCompiler) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    /// Returns the collaborators as trait objects.
    #[must_use]
    pub fn collaborators(&self) -> RetryCollaborators {
        RetryCollaborators {
            pipelines: self.pipelines.clone(),
            ledger: self.ledger.clone(),
            compiler: self.compiler.clone(),
            runtime: self.runtime.clone(),
            summaries: self.summaries.clone(),
        }
    }

    /// Creates a service over the fixture, collecting its events.
    #[must_use]
    pub fn service(&self) -> RetryExecutionService {
        RetryExecutionService::new(self.collaborators()).with_event_sink(self.events.clone())
    }

    /// Stores a pipeline of `layout` and records an execution of it that
    /// finished a minute ago.
    ///
    /// Every stage in `statuses` gets a stage and a strategy node execution
    /// in the ledger and a layout entry in the execution summary. Returns the
    /// processed YAML of the execution.
    ///
    /// # Errors
    ///
    /// Fails if the compiler or the summary store fails.
    pub async fn seed_execution(
        &self,
        execution_id: &str,
        pipeline_identifier: &str,
        layout: &[&[&str]],
        statuses: &[(&str, ExecutionStatus)],
    ) -> StoreResult<String> {
        let yaml = pipeline_yaml(pipeline_identifier, layout);
        self.pipelines
            .insert(PipelineRecord::new(pipeline_identifier, yaml.as_str()));
        let processed_yaml = self.compiler.process_yaml(&yaml).await?;

        self.ledger.insert_metadata(PlanExecutionMetadata {
            plan_execution_id: execution_id.to_string(),
            pipeline_identifier: pipeline_identifier.to_string(),
            yaml,
            processed_yaml: processed_yaml.clone(),
            trigger_info: Some(ExecutionTriggerInfo::new(
                TriggerType::Manual,
                TriggeredBy::new("admin"),
            )),
            ..PlanExecutionMetadata::default()
        });
        self.ledger
            .set_stage_details(execution_id, stage_ledger(layout, statuses));

        let mut summary = PipelineExecutionSummary::new(execution_id, pipeline_identifier)
            .with_status(overall_status(statuses))
            .with_created_at(now_millis() - 60_000);
        let definition = PipelineDefinition::parse(&processed_yaml)
            .map_err(|e| StoreError::new("compiler", e.to_string()))?;
        for entry in definition.entries() {
            for identifier in entry.identifiers() {
                let Some((_, status)) = statuses.iter().find(|(id, _)| *id == identifier) else {
                    continue;
                };
                let Some(uuid) = stage_uuid(&definition, identifier) else {
                    continue;
                };
                let fqn = Fqn::for_stage(identifier).to_string();
                self.ledger.record_node_execution(
                    execution_id,
                    identifier,
                    PriorNodeExecution::new(
                        format!("{execution_id}-{identifier}"),
                        uuid.as_str(),
                        fqn.as_str(),
                        StepType::new(STAGE_STEP_TYPE, StepCategory::Stage),
                    ),
                );
                self.ledger.record_node_execution(
                    execution_id,
                    identifier,
                    PriorNodeExecution::new(
                        format!("{execution_id}-{identifier}-strategy"),
                        strategy_uuid(&uuid),
                        fqn,
                        StepType::strategy(),
                    ),
                );
                let mut layout_entry = StageLayoutEntry::new(identifier);
                layout_entry.status = *status;
                layout_entry.node_execution_id = Some(format!("{execution_id}-{identifier}"));
                summary = summary.with_layout_entry(uuid, layout_entry);
            }
        }
        self.summaries.create(summary).await?;

        Ok(processed_yaml)
    }

    /// Stores a pipeline of `layout` and records an execution that ran only
    /// the stages in `stage_identifiers`.
    ///
    /// The execution is seeded as [`RetryFixture::seed_execution`] does for
    /// the narrowed layout; parallel groups should be kept whole or left out.
    ///
    /// # Errors
    ///
    /// Fails if the compiler or the summary store fails.
    pub async fn seed_stages_execution(
        &self,
        execution_id: &str,
        pipeline_identifier: &str,
        layout: &[&[&str]],
        stage_identifiers: &[&str],
        statuses: &[(&str, ExecutionStatus)],
    ) -> StoreResult<String> {
        let ran: Vec<Vec<&str>> = layout
            .iter()
            .map(|entry| {
                entry
                    .iter()
                    .copied()
                    .filter(|id| stage_identifiers.contains(id))
                    .collect::<Vec<_>>()
            })
            .filter(|entry| !entry.is_empty())
            .collect();
        let ran_layout: Vec<&[&str]> = ran.iter().map(Vec::as_slice).collect();

        let processed_yaml = self
            .seed_execution(execution_id, pipeline_identifier, &ran_layout, statuses)
            .await?;

        let yaml_to_run = pipeline_yaml(pipeline_identifier, &ran_layout);
        let full_yaml = pipeline_yaml(pipeline_identifier, layout);
        self.pipelines
            .insert(PipelineRecord::new(pipeline_identifier, full_yaml.as_str()));
        self.ledger.insert_metadata(PlanExecutionMetadata {
            plan_execution_id: execution_id.to_string(),
            pipeline_identifier: pipeline_identifier.to_string(),
            yaml: yaml_to_run.clone(),
            processed_yaml: processed_yaml.clone(),
            stages_execution_info: Some(StagesExecutionInfo {
                is_stages_execution: true,
                pipeline_yaml_to_run: yaml_to_run,
                full_pipeline_yaml: Some(full_yaml),
                stage_identifiers: Some(
                    stage_identifiers.iter().map(ToString::to_string).collect(),
                ),
                expression_values: None,
            }),
            trigger_info: Some(ExecutionTriggerInfo::new(
                TriggerType::Manual,
                TriggeredBy::new("admin"),
            )),
            ..PlanExecutionMetadata::default()
        });

        Ok(processed_yaml)
    }
}

fn stage_uuid(definition: &PipelineDefinition, identifier: &str) -> Option<String> {
    definition.entries().iter().find_map(|entry| match entry {
        StageEntry::Stage(stage) if stage.identifier == identifier => {
            stage.uuid.clone()
        }
        StageEntry::Parallel(group) => group
            .members
            .iter()
            .find(|member| member.identifier == identifier)
            .and_then(|member| member.uuid.clone()),
        StageEntry::Stage(_) => None,
    })
}

fn overall_status(statuses: &[(&str, ExecutionStatus)]) -> ExecutionStatus {
    statuses
        .iter()
        .map(|(_, status)| *status)
        .find(|status| status.is_retryable_failure())
        .unwrap_or(ExecutionStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::LedgerStore;
    use crate::retry::build_retry_index;

    #[test]
    fn test_pipeline_yaml_parses() {
        let yaml = pipeline_yaml("deploy", &[&["build"], &["a", "b"], &["ship"]]);
        let definition = PipelineDefinition::parse(&yaml).unwrap();
        assert_eq!(definition.stage_identifiers(), vec!["build", "a", "b", "ship"]);
        assert_eq!(definition.entries()[1].kind(), "parallel");
    }

    #[test]
    fn test_stage_ledger_groups_parallel_members() {
        let ledger = stage_ledger(
            &[&["build"], &["a", "b"], &["ship"]],
            &[("build", ExecutionStatus::Success), ("a", ExecutionStatus::Failed)],
        );
        let index = build_retry_index(&ledger).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.groups()[1].identifiers(), vec!["a", "b"]);
        assert_eq!(index.groups()[1].members[1].status, ExecutionStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_seed_execution_records_ledger_and_summary() {
        let fixture = RetryFixture::new();
        fixture
            .seed_execution(
                "e1",
                "deploy",
                &[&["build"], &["ship"]],
                &[("build", ExecutionStatus::Success), ("ship", ExecutionStatus::Failed)],
            )
            .await
            .unwrap();

        let fqns = fixture
            .ledger
            .get_stage_fqns("e1", &["build".to_string(), "ship".to_string()])
            .await
            .unwrap();
        assert_eq!(fqns.len(), 2);

        let summary = fixture.summaries.get("e1").await.unwrap().unwrap();
        assert_eq!(summary.status, ExecutionStatus::Failed);
        assert_eq!(summary.layout_node_map.len(), 2);
    }
}
