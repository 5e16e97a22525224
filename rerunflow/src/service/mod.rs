//! Retry orchestration over injected collaborators.
//!
//! [`RetryExecutionService`] wires the retry core together:
//!
//! 1. validate the execution ([`RetryValidator`])
//! 2. resolve the stages to re-run from the retry index
//! 3. splice the previous processed tree into the current one, narrowed to
//!    the executed stages when only a subset of the pipeline ran
//! 4. compile the spliced tree and wait for the plan
//! 5. rewrite the plan so skipped stages reuse prior results
//! 6. start the runtime and record the new execution in the retry chain

mod history;
mod request;
mod validation;


use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ResumeConfig;
use crate::definition::PipelineDefinition;
use crate::errors::{Result, RetryError};
use crate::events::{types, EventSink, NoOpEventSink};
use crate::lineage::{RetryExecutionMetadata, TriggerLineageBuilder};
use crate::observability::{RetrySpanAttributes, SpanTimer};
use crate::plan::{Plan, PlanTransformer};
use crate::ports::{
    CompileRequest, LedgerStore, PipelineStore, PlanCompiler, PlanExecutionMetadata, Runtime,
    StagesExecutionInfo, SummaryStore,
};
use crate::retry::{build_retry_index, partition, resolve_retry_stages, RetryIndex};
use crate::summary::{groups, PipelineExecutionSummary, StageLayoutEntry, SummaryPatch};
use crate::utils::generate_execution_id;

pub use history::{
    outside_chain_message, retry_history, retry_latest_execution, NOT_RETRIED_MESSAGE,
};
pub use request::{
    ExecutionInfo, RetryExecutionArgs, RetryHistoryResponse, RetryInfo,
    RetryLatestExecutionResponse, RetryOutcome, RetryRequest,
};
pub use validation::{
    first_failed_gate, missing_execution_message, pipeline_missing_message, retention_message,
    GateInputs, RetryValidator, ValidatedExecution, NOT_LATEST_MESSAGE, ROLLED_BACK_MESSAGE,
};

/// The collaborators a [`RetryExecutionService`] works against.
#[derive(Clone)]
pub struct RetryCollaborators {
    /// Stored pipeline definitions.
    pub pipelines: Arc<dyn PipelineStore>,
    /// The execution ledger.
    pub ledger: Arc<dyn LedgerStore>,
    /// The plan compiler.
    pub compiler: Arc<dyn PlanCompiler>,
    /// The execution runtime.
    pub runtime: Arc<dyn Runtime>,
    /// The summary read model.
    pub summaries: Arc<dyn SummaryStore>,
}

impl std::fmt::Debug for RetryCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryCollaborators").finish_non_exhaustive()
    }
}

/// Plans and starts retries of prior executions.
pub struct RetryExecutionService {
    config: ResumeConfig,
    collaborators: RetryCollaborators,
    validator: RetryValidator,
    transformer: PlanTransformer,
    lineage: TriggerLineageBuilder,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for RetryExecutionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutionService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryExecutionService {
    /// Creates a service with the default configuration.
    #[must_use]
    pub fn new(collaborators: RetryCollaborators) -> Self {
        Self::with_parts(ResumeConfig::default(), collaborators, Arc::new(NoOpEventSink))
    }

    fn with_parts(
        config: ResumeConfig,
        collaborators: RetryCollaborators,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let validator = RetryValidator::new(
            config.clone(),
            Arc::clone(&collaborators.pipelines),
            Arc::clone(&collaborators.ledger),
            Arc::clone(&collaborators.summaries),
        );
        Self {
            validator,
            transformer: PlanTransformer::new(Arc::clone(&collaborators.ledger)),
            lineage: TriggerLineageBuilder::new(Arc::clone(&collaborators.ledger)),
            config,
            collaborators,
            events,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(self, config: ResumeConfig) -> Self {
        Self::with_parts(config, self.collaborators, self.events)
    }

    /// Sets the sink receiving `retry.*` lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ResumeConfig {
        &self.config
    }

    /// Reports whether an execution may be retried, with its retry groups.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::UpstreamUnavailable`] if a store fails.
    pub async fn validate_retry(
        &self,
        pipeline_identifier: &str,
        plan_execution_id: &str,
    ) -> Result<RetryInfo> {
        let info = self
            .validator
            .validate(pipeline_identifier, plan_execution_id)
            .await?;
        let event_type = if info.is_resumable {
            types::RETRY_VALIDATED
        } else {
            types::RETRY_REJECTED
        };
        self.events
            .emit(
                event_type,
                Some(json!({
                    "planExecutionId": plan_execution_id,
                    "errorMessage": info.error_message,
                })),
            )
            .await;
        Ok(info)
    }

    /// Returns the retry groups of an execution.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::NotResumable`] if the execution retained no
    /// stage ledger, or [`RetryError::UpstreamUnavailable`] if the ledger
    /// fails.
    pub async fn get_retry_stages(&self, plan_execution_id: &str) -> Result<RetryIndex> {
        let entries = self
            .collaborators
            .ledger
            .get_stage_details(plan_execution_id)
            .await?;
        build_retry_index(&entries)
    }

    /// Resolves the stages a retry of `plan_execution_id` would re-run.
    ///
    /// # Errors
    ///
    /// See [`RetryExecutionService::get_retry_stages`] and
    /// [`resolve_retry_stages`].
    pub async fn resolve_stages(
        &self,
        plan_execution_id: &str,
        requested: &[String],
        run_all_stages: bool,
    ) -> Result<Vec<String>> {
        let index = self.get_retry_stages(plan_execution_id).await?;
        resolve_retry_stages(
            &index,
            requested,
            run_all_stages,
            self.config.only_failed_in_parallel_groups,
        )
    }

    /// Lists the retry chain rooted at `root_execution_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::UpstreamUnavailable`] if the summary store fails.
    pub async fn retry_history(
        &self,
        root_execution_id: &str,
        plan_execution_id: &str,
    ) -> Result<RetryHistoryResponse> {
        retry_history(
            self.collaborators.summaries.as_ref(),
            root_execution_id,
            plan_execution_id,
        )
        .await
    }

    /// Returns the newest execution of the retry chain rooted at `root_execution_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::UpstreamUnavailable`] if the summary store fails.
    pub async fn retry_latest_execution(
        &self,
        root_execution_id: &str,
    ) -> Result<RetryLatestExecutionResponse> {
        retry_latest_execution(self.collaborators.summaries.as_ref(), root_execution_id).await
    }

    /// Builds everything needed to start a retry, without starting it.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::NotResumable`] if a gate fails or the ledger is
    /// empty, [`RetryError::InvalidRequest`] for bad stage selections,
    /// [`RetryError::UpstreamUnavailable`] if a collaborator fails or the
    /// plan is not compiled in time, and [`RetryError::Invariant`] if the
    /// previous and current trees or plans disagree.
    pub async fn build_execution_args(&self, request: &RetryRequest) -> Result<RetryExecutionArgs> {
        let timer = SpanTimer::start("build_execution_args");
        let previous_id = request.previous_execution_id.as_str();

        let validated = match self
            .validator
            .check(&request.pipeline_identifier, previous_id)
            .await
        {
            Ok(validated) => validated,
            Err(err) => {
                self.reject(previous_id, &err).await;
                return Err(err);
            }
        };

        let retry_stages = match resolve_retry_stages(
            &validated.index,
            &request.retry_stages,
            request.run_all_stages,
            self.config.only_failed_in_parallel_groups,
        ) {
            Ok(stages) => stages,
            Err(err) => {
                self.reject(previous_id, &err).await;
                return Err(err);
            }
        };

        if validated.metadata.processed_yaml.trim().is_empty() {
            return Err(RetryError::not_resumable(missing_execution_message(previous_id)));
        }

        let stages_execution = validated
            .metadata
            .stages_execution_info
            .as_ref()
            .filter(|info| info.is_stages_execution);
        let mut yaml = validated.pipeline.yaml.clone();
        let mut current_processed = self.collaborators.compiler.process_yaml(&yaml).await?;
        if let Some(stage_identifiers) =
            stages_execution.and_then(|info| info.stage_identifiers.as_deref())
        {
            yaml = PipelineDefinition::parse(&yaml)?
                .retain_stages(stage_identifiers)
                .to_yaml()?;
            current_processed = PipelineDefinition::parse(&current_processed)?
                .retain_stages(stage_identifiers)
                .to_yaml()?;
            debug!(
                previous_execution_id = previous_id,
                stages = ?stage_identifiers,
                "Narrowed current pipeline to the executed stage subset"
            );
        }
        let stages_execution_info = stages_execution.map(|info| StagesExecutionInfo {
            is_stages_execution: true,
            pipeline_yaml_to_run: yaml.clone(),
            full_pipeline_yaml: Some(validated.pipeline.yaml.clone()),
            stage_identifiers: info.stage_identifiers.clone(),
            expression_values: info.expression_values.clone(),
        });

        let spliced = partition(
            &validated.metadata.processed_yaml,
            &current_processed,
            &retry_stages,
        )?;
        let processed_yaml = spliced.to_yaml()?;
        let skipped_stages = spliced.skipped_identifiers().to_vec();
        let retried_stages = spliced.retried_identifiers().to_vec();

        let trigger_info = self
            .lineage
            .build(Some(previous_id), request.triggered_by.clone())
            .await?;
        let retry_metadata = RetryExecutionMetadata::following(
            previous_id,
            validated
                .summary
                .as_ref()
                .and_then(|summary| summary.retry_execution_metadata.as_ref()),
        );

        let plan_execution_id = generate_execution_id();
        let metadata = PlanExecutionMetadata {
            plan_execution_id: plan_execution_id.clone(),
            pipeline_identifier: request.pipeline_identifier.clone(),
            yaml,
            processed_yaml: processed_yaml.clone(),
            stages_execution_info,
            trigger_info: Some(trigger_info.clone()),
            retry_stage_identifiers: retried_stages.clone(),
        };

        self.collaborators
            .compiler
            .submit(CompileRequest {
                plan_execution_id: plan_execution_id.clone(),
                processed_yaml,
                metadata: metadata.clone(),
            })
            .await?;
        let compiled = self.await_plan(&plan_execution_id).await?;
        if !compiled.valid {
            warn!(plan_execution_id = %plan_execution_id, "Compiled retry plan is invalid");
            return Err(RetryError::invalid_request("The retried pipeline failed to compile")
                .with_context("plan_execution_id", plan_execution_id.as_str()));
        }

        let plan = self
            .transformer
            .rewrite(&compiled, &skipped_stages, &retried_stages, previous_id)
            .await?;

        let attributes = RetrySpanAttributes::new()
            .with_previous_execution_id(previous_id)
            .with_new_execution_id(plan_execution_id.as_str())
            .with_pipeline_identifier(request.pipeline_identifier.as_str())
            .with_retry_stages(&retried_stages);
        self.events
            .emit(
                types::RETRY_PLAN_REWRITTEN,
                Some(json!({
                    "attributes": attributes.to_attributes(),
                    "skippedStages": skipped_stages,
                    "identityNodes": plan.identity_count(),
                })),
            )
            .await;

        debug!(
            previous_execution_id = previous_id,
            plan_execution_id = %plan_execution_id,
            duration_ms = timer.finish(),
            "Built retry execution args"
        );

        Ok(RetryExecutionArgs {
            plan_execution_id,
            plan,
            metadata,
            trigger_info,
            retry_metadata,
            skipped_stages,
            retry_stages: retried_stages,
        })
    }

    /// Builds and starts a retry, then records it in the retry chain.
    ///
    /// The new summary starts with the previous layout entries of the skipped
    /// stages, and the previous summary stops being the chain's latest.
    ///
    /// # Errors
    ///
    /// See [`RetryExecutionService::build_execution_args`]; additionally
    /// returns [`RetryError::UpstreamUnavailable`] if the runtime or the
    /// summary store fails.
    pub async fn retry(&self, request: &RetryRequest) -> Result<RetryOutcome> {
        let args = self.build_execution_args(request).await?;
        let previous_id = request.previous_execution_id.as_str();

        let handle = self
            .collaborators
            .runtime
            .start(
                args.plan.clone(),
                request.abstractions.clone(),
                args.metadata.clone(),
            )
            .await?;

        let previous_summary = self.collaborators.summaries.get(previous_id).await?;
        let summary = initial_summary(&args, previous_summary.as_ref(), handle.started_at);
        self.collaborators.summaries.create(summary).await?;
        if previous_summary.is_some() {
            self.collaborators
                .summaries
                .patch(
                    previous_id,
                    SummaryPatch::new().set("isLatestExecution", false),
                )
                .await?;
        }

        info!(
            previous_execution_id = previous_id,
            plan_execution_id = %handle.plan_execution_id,
            root_execution_id = %args.retry_metadata.root_execution_id,
            retry_stages = ?args.retry_stages,
            skipped = args.skipped_stages.len(),
            "Started retry execution"
        );
        self.events
            .emit(
                types::RETRY_STARTED,
                Some(json!({
                    "previousExecutionId": previous_id,
                    "planExecutionId": handle.plan_execution_id,
                    "rootExecutionId": args.retry_metadata.root_execution_id,
                    "retryStages": args.retry_stages,
                })),
            )
            .await;

        Ok(RetryOutcome {
            handle,
            skipped_stages: args.skipped_stages,
            retry_stages: args.retry_stages,
        })
    }

    async fn await_plan(&self, plan_execution_id: &str) -> Result<Plan> {
        let interval = self.config.plan_poll_interval();
        let compiler = &self.collaborators.compiler;
        let wait = async {
            loop {
                if let Some(plan) = compiler.poll(plan_execution_id).await? {
                    return Ok::<Plan, RetryError>(plan);
                }
                tokio::time::sleep(interval).await;
            }
        };

        match tokio::time::timeout(self.config.plan_wait_timeout(), wait).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    plan_execution_id,
                    timeout_ms = self.config.plan_wait_timeout_ms,
                    "Timed out waiting for the compiled plan"
                );
                Err(RetryError::upstream(
                    "compiler",
                    format!(
                        "plan for {plan_execution_id} was not ready within {} ms",
                        self.config.plan_wait_timeout_ms
                    ),
                ))
            }
        }
    }

    async fn reject(&self, plan_execution_id: &str, err: &RetryError) {
        self.events
            .emit(
                types::RETRY_REJECTED,
                Some(json!({
                    "planExecutionId": plan_execution_id,
                    "code": err.code(),
                    "errorMessage": err.user_message(),
                })),
            )
            .await;
    }
}

/// Summary of a freshly started retry.
///
/// Stage nodes of the plan get a layout entry each; skipped stages inherit
/// their entry from the previous summary.
fn initial_summary(
    args: &RetryExecutionArgs,
    previous: Option<&PipelineExecutionSummary>,
    started_at: i64,
) -> PipelineExecutionSummary {
    let mut summary = PipelineExecutionSummary::new(
        args.plan_execution_id.as_str(),
        args.metadata.pipeline_identifier.as_str(),
    )
    .with_times(started_at, None)
    .with_retry_metadata(args.retry_metadata.clone())
    .with_trigger_info(args.trigger_info.clone());

    let previous_layout = previous.map(|summary| &summary.layout_node_map);
    let mut layout = HashMap::new();
    for node in args.plan.nodes() {
        if node.group() != Some(groups::STAGE) {
            continue;
        }
        let inherited = node
            .is_identity()
            .then(|| previous_layout.and_then(|map| map.get(node.uuid())))
            .flatten()
            .cloned();
        layout.insert(
            node.uuid().to_string(),
            inherited.unwrap_or_else(|| StageLayoutEntry::new(node.identifier())),
        );
    }
    summary.layout_node_map = layout;
    summary
}
