//! In-memory collaborator stores.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::plan::PriorNodeExecution;
use crate::ports::{
    LedgerStore, PipelineRecord, PipelineStore, PlanExecutionMetadata, StoreError, StoreResult,
    SummaryStore,
};
use crate::retry::RetryStageInfo;
use crate::summary::{PipelineExecutionSummary, SummaryPatch};

/// In-memory pipeline store.
#[derive(Debug, Default)]
pub struct InMemoryPipelineStore {
    pipelines: DashMap<String, PipelineRecord>,
}

impl InMemoryPipelineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a pipeline.
    pub fn insert(&self, record: PipelineRecord) {
        self.pipelines.insert(record.identifier.clone(), record);
    }

    /// Deletes a pipeline.
    pub fn remove(&self, identifier: &str) {
        self.pipelines.remove(identifier);
    }
}

#[async_trait]
impl PipelineStore for InMemoryPipelineStore {
    async fn get(&self, pipeline_identifier: &str) -> StoreResult<Option<PipelineRecord>> {
        Ok(self
            .pipelines
            .get(pipeline_identifier)
            .map(|entry| entry.value().clone()))
    }
}

/// In-memory execution ledger.
///
/// Can be switched to an unavailable state to exercise upstream failures.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    metadata: DashMap<String, PlanExecutionMetadata>,
    stage_details: DashMap<String, Vec<RetryStageInfo>>,
    stage_fqns: DashMap<String, HashMap<String, String>>,
    node_executions: DashMap<String, Vec<PriorNodeExecution>>,
    unavailable: AtomicBool,
}

impl InMemoryLedgerStore {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the metadata of an execution.
    pub fn insert_metadata(&self, metadata: PlanExecutionMetadata) {
        self.metadata
            .insert(metadata.plan_execution_id.clone(), metadata);
    }

    /// Replaces the stage ledger of an execution.
    pub fn set_stage_details(&self, execution_id: &str, details: Vec<RetryStageInfo>) {
        self.stage_details.insert(execution_id.to_string(), details);
    }

    /// Records a node execution of `stage_identifier`.
    ///
    /// The first record of a stage also registers its FQN.
    pub fn record_node_execution(
        &self,
        execution_id: &str,
        stage_identifier: &str,
        execution: PriorNodeExecution,
    ) {
        self.stage_fqns
            .entry(execution_id.to_string())
            .or_default()
            .entry(stage_identifier.to_string())
            .or_insert_with(|| execution.stage_fqn.clone());
        self.node_executions
            .entry(execution_id.to_string())
            .or_default()
            .push(execution);
    }

    /// Makes every call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new("ledger", "store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_stage_details(&self, execution_id: &str) -> StoreResult<Vec<RetryStageInfo>> {
        self.check_available()?;
        Ok(self
            .stage_details
            .get(execution_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn get_execution_metadata(
        &self,
        execution_id: &str,
    ) -> StoreResult<Option<PlanExecutionMetadata>> {
        self.check_available()?;
        Ok(self
            .metadata
            .get(execution_id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_stage_fqns(
        &self,
        execution_id: &str,
        identifiers: &[String],
    ) -> StoreResult<HashMap<String, String>> {
        self.check_available()?;
        let Some(recorded) = self.stage_fqns.get(execution_id) else {
            return Ok(HashMap::new());
        };
        Ok(identifiers
            .iter()
            .filter_map(|id| recorded.get(id).map(|fqn| (id.clone(), fqn.clone())))
            .collect())
    }

    async fn get_node_executions(
        &self,
        execution_id: &str,
        stage_fqns: &[String],
    ) -> StoreResult<Vec<PriorNodeExecution>> {
        self.check_available()?;
        let Some(recorded) = self.node_executions.get(execution_id) else {
            return Ok(Vec::new());
        };
        Ok(recorded
            .iter()
            .filter(|execution| stage_fqns.contains(&execution.stage_fqn))
            .cloned()
            .collect())
    }
}

/// In-memory summary store.
///
/// Documents are kept as JSON so patches address the same field paths a
/// document database would. A patch holds the document's shard lock while it
/// applies, so concurrent patches of one document never interleave.
#[derive(Debug, Default)]
pub struct InMemorySummaryStore {
    documents: DashMap<String, serde_json::Value>,
}

impl InMemorySummaryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored summaries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Returns the raw JSON document of a summary.
    #[must_use]
    pub fn document(&self, plan_execution_id: &str) -> Option<serde_json::Value> {
        self.documents
            .get(plan_execution_id)
            .map(|entry| entry.value().clone())
    }
}

fn decode(document: &serde_json::Value) -> StoreResult<PipelineExecutionSummary> {
    serde_json::from_value(document.clone())
        .map_err(|e| StoreError::new("summary store", format!("corrupt document: {e}")))
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn get(&self, plan_execution_id: &str) -> StoreResult<Option<PipelineExecutionSummary>> {
        self.documents
            .get(plan_execution_id)
            .map(|entry| decode(entry.value()))
            .transpose()
    }

    async fn create(&self, summary: PipelineExecutionSummary) -> StoreResult<()> {
        let document = serde_json::to_value(&summary)
            .map_err(|e| StoreError::new("summary store", e.to_string()))?;
        self.documents
            .insert(summary.plan_execution_id.clone(), document);
        Ok(())
    }

    async fn patch(&self, plan_execution_id: &str, patch: SummaryPatch) -> StoreResult<()> {
        let mut document = self.documents.get_mut(plan_execution_id).ok_or_else(|| {
            StoreError::new(
                "summary store",
                format!("no summary for execution {plan_execution_id}"),
            )
        })?;
        patch.apply(document.value_mut());
        Ok(())
    }

    async fn list_by_root_execution(
        &self,
        root_execution_id: &str,
    ) -> StoreResult<Vec<PipelineExecutionSummary>> {
        let mut chain = Vec::new();
        for entry in self.documents.iter() {
            let summary = decode(entry.value())?;
            if summary.root_execution_id() == root_execution_id {
                chain.push(summary);
            }
        }
        chain.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutionStatus, StepType};
    use crate::lineage::RetryExecutionMetadata;
    use crate::summary::layout_path;

    #[tokio::test]
    async fn test_ledger_fqns_and_node_executions() {
        let ledger = InMemoryLedgerStore::new();
        ledger.record_node_execution(
            "e1",
            "build",
            PriorNodeExecution::new("n1", "u1", "pipeline.stages.build", StepType::strategy()),
        );
        ledger.record_node_execution(
            "e1",
            "test",
            PriorNodeExecution::new("n2", "u2", "pipeline.stages.test", StepType::strategy()),
        );

        let fqns = ledger
            .get_stage_fqns("e1", &["build".to_string(), "deploy".to_string()])
            .await
            .unwrap();
        assert_eq!(fqns.len(), 1);
        assert_eq!(fqns["build"], "pipeline.stages.build");

        let executions = ledger
            .get_node_executions("e1", &["pipeline.stages.test".to_string()])
            .await
            .unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].node_execution_id, "n2");
    }

    #[tokio::test]
    async fn test_ledger_unavailable() {
        let ledger = InMemoryLedgerStore::new();
        ledger.set_stage_details("e1", vec![RetryStageInfo::new("a", ExecutionStatus::Failed)]);
        ledger.set_unavailable(true);
        let err = ledger.get_stage_details("e1").await.unwrap_err();
        assert_eq!(err.collaborator, "ledger");

        ledger.set_unavailable(false);
        assert_eq!(ledger.get_stage_details("e1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_patch_and_chain_listing() {
        let store = InMemorySummaryStore::new();
        store
            .create(PipelineExecutionSummary::new("e1", "p").with_created_at(1))
            .await
            .unwrap();
        store
            .create(
                PipelineExecutionSummary::new("e2", "p")
                    .with_created_at(2)
                    .with_retry_metadata(RetryExecutionMetadata::following("e1", None)),
            )
            .await
            .unwrap();
        store
            .create(PipelineExecutionSummary::new("other", "p").with_created_at(3))
            .await
            .unwrap();

        store
            .patch(
                "e1",
                SummaryPatch::new()
                    .set("isLatestExecution", false)
                    .set(layout_path("u1", "nodeIdentifier"), "build"),
            )
            .await
            .unwrap();
        let first = store.get("e1").await.unwrap().unwrap();
        assert!(!first.is_latest_execution);
        assert_eq!(first.layout_node_map["u1"].node_identifier, "build");

        let chain = store.list_by_root_execution("e1").await.unwrap();
        let ids: Vec<&str> = chain.iter().map(|s| s.plan_execution_id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }

    #[tokio::test]
    async fn test_pipeline_store_remove() {
        let store = InMemoryPipelineStore::new();
        store.insert(PipelineRecord::new("p", "pipeline: {}"));
        assert!(store.get("p").await.unwrap().is_some());
        store.remove("p");
        assert!(store.get("p").await.unwrap().is_none());
    }
}
