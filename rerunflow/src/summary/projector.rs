//! Projection of node execution events onto the summary read model.
//!
//! Each event is turned into a field-scoped [`SummaryPatch`]. Sibling stages
//! of a parallel group report concurrently, so the projector never reads
//! and rewrites a whole document: it only hands patches to the store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::ambiance::{groups, Ambiance};
use super::model::{ExecutionErrorInfo, FailureInfo, SkipInfo};
use super::patch::{layout_path, SummaryPatch};
use crate::core::ExecutionStatus;
use crate::errors::Result;
use crate::ports::SummaryStore;

/// A node execution status change reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionEvent {
    /// The node execution id.
    pub node_execution_id: String,
    /// Context of the node; the last level is the node itself.
    pub ambiance: Ambiance,
    /// New status of the node.
    pub status: ExecutionStatus,
    /// Epoch millis the node started.
    #[serde(default)]
    pub start_ts: Option<i64>,
    /// Epoch millis the node ended.
    #[serde(default)]
    pub end_ts: Option<i64>,
    /// Failure details, for failed nodes.
    #[serde(default)]
    pub failure_info: Option<FailureInfo>,
    /// Skip details, for skipped nodes.
    #[serde(default)]
    pub skip_info: Option<SkipInfo>,
}

impl NodeExecutionEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(
        node_execution_id: impl Into<String>,
        ambiance: Ambiance,
        status: ExecutionStatus,
    ) -> Self {
        Self {
            node_execution_id: node_execution_id.into(),
            ambiance,
            status,
            start_ts: None,
            end_ts: None,
            failure_info: None,
            skip_info: None,
        }
    }

    /// Sets start and end time.
    #[must_use]
    pub fn with_times(mut self, start_ts: Option<i64>, end_ts: Option<i64>) -> Self {
        self.start_ts = start_ts;
        self.end_ts = end_ts;
        self
    }

    /// Sets failure details.
    #[must_use]
    pub fn with_failure(mut self, failure_info: FailureInfo) -> Self {
        self.failure_info = Some(failure_info);
        self
    }

    /// Sets skip details.
    #[must_use]
    pub fn with_skip(mut self, skip_info: SkipInfo) -> Self {
        self.skip_info = Some(skip_info);
        self
    }
}

/// Computes the summary patch for one event.
///
/// Stage nodes update their layout entry, pipeline nodes the top-level
/// fields, and barrier steps flag their owning stage. Other nodes yield an
/// empty patch.
///
/// # Errors
///
/// Returns [`crate::errors::RetryError::Serialization`] if a payload cannot
/// be serialized.
pub fn project_node_event(event: &NodeExecutionEvent) -> Result<SummaryPatch> {
    let Some(level) = event.ambiance.current_level() else {
        return Ok(SummaryPatch::new());
    };

    let mut patch = SummaryPatch::new();

    if level.step_type.is_barrier() {
        if let Some(stage) = event.ambiance.stage_level() {
            patch = patch.set(layout_path(&stage.setup_id, "barrierFound"), true);
        }
    }

    let status = serde_json::to_value(event.status)?;
    let terminal = event.status.is_terminal();

    match level.group.as_str() {
        groups::STAGE => {
            let field = |name: &str| layout_path(&level.setup_id, name);
            patch = patch
                .set(field("status"), status)
                .set(field("nodeExecutionId"), event.node_execution_id.as_str());
            if let Some(start_ts) = event.start_ts {
                patch = patch.set(field("startTs"), start_ts);
            }
            if terminal {
                if let Some(end_ts) = event.end_ts {
                    patch = patch.set(field("endTs"), end_ts);
                }
            }
            if event.status.is_broken() {
                if let Some(failure) = &event.failure_info {
                    patch = patch.set(field("failureInfo"), serde_json::to_value(failure)?);
                }
            }
            if event.status == ExecutionStatus::Skipped {
                if let Some(skip) = &event.skip_info {
                    patch = patch.set(field("skipInfo"), serde_json::to_value(skip)?);
                }
            }
        }
        groups::PIPELINE => {
            patch = patch.set("status", status);
            if let Some(start_ts) = event.start_ts {
                patch = patch.set("startTs", start_ts);
            }
            if terminal {
                if let Some(end_ts) = event.end_ts {
                    patch = patch.set("endTs", end_ts);
                }
            }
            if event.status.is_broken() {
                if let Some(failure) = &event.failure_info {
                    let error = ExecutionErrorInfo {
                        message: failure.message.clone(),
                    };
                    patch = patch.set("executionErrorInfo", serde_json::to_value(error)?);
                }
            }
        }
        _ => {}
    }

    Ok(patch)
}

/// Applies node execution events to the summary store.
pub struct ExecutionSummaryProjector {
    store: Arc<dyn SummaryStore>,
}

impl std::fmt::Debug for ExecutionSummaryProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSummaryProjector").finish_non_exhaustive()
    }
}

impl ExecutionSummaryProjector {
    /// Creates a projector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SummaryStore>) -> Self {
        Self { store }
    }

    /// Projects one event; returns true if the summary was patched.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::RetryError::UpstreamUnavailable`] if the store
    /// rejects the patch.
    pub async fn handle(&self, event: &NodeExecutionEvent) -> Result<bool> {
        let patch = project_node_event(event)?;
        if patch.is_empty() {
            return Ok(false);
        }

        debug!(
            plan_execution_id = %event.ambiance.plan_execution_id,
            node_execution_id = %event.node_execution_id,
            status = %event.status,
            fields = patch.len(),
            "Projecting node event onto summary"
        );

        self.store
            .patch(&event.ambiance.plan_execution_id, patch)
            .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StepCategory, StepType};
    use crate::summary::ambiance::Level;
    use crate::summary::model::{PipelineExecutionSummary, StageLayoutEntry};
    use crate::testing::InMemorySummaryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pipeline_level() -> Level {
        Level::new(
            "p-uuid",
            "p-exec",
            "deploy",
            StepType::new("PIPELINE", StepCategory::Pipeline),
            groups::PIPELINE,
        )
    }

    fn stage_level(uuid: &str) -> Level {
        Level::new(
            uuid,
            format!("{uuid}-exec"),
            uuid,
            StepType::new("DEPLOYMENT", StepCategory::Stage),
            groups::STAGE,
        )
    }

    fn stage_event(uuid: &str, status: ExecutionStatus) -> NodeExecutionEvent {
        NodeExecutionEvent::new(
            format!("{uuid}-exec"),
            Ambiance::new("exec-1")
                .with_level(pipeline_level())
                .with_level(stage_level(uuid)),
            status,
        )
    }

    #[test]
    fn test_failed_stage_patch() {
        let event = stage_event("s1", ExecutionStatus::Failed)
            .with_times(Some(10), Some(20))
            .with_failure(FailureInfo::new("boom"));
        let patch = project_node_event(&event).unwrap();

        assert_eq!(patch.get("layoutNodeMap.s1.status"), Some(&json!("FAILED")));
        assert_eq!(patch.get("layoutNodeMap.s1.endTs"), Some(&json!(20)));
        assert_eq!(
            patch.get("layoutNodeMap.s1.failureInfo"),
            Some(&json!({"message": "boom", "failureTypes": []}))
        );
        assert!(patch.get("status").is_none());
    }

    #[test]
    fn test_running_stage_has_no_end() {
        let event = stage_event("s1", ExecutionStatus::Running).with_times(Some(10), Some(99));
        let patch = project_node_event(&event).unwrap();
        assert_eq!(patch.get("layoutNodeMap.s1.startTs"), Some(&json!(10)));
        assert!(patch.get("layoutNodeMap.s1.endTs").is_none());
    }

    #[test]
    fn test_skipped_stage_patch() {
        let event = stage_event("s2", ExecutionStatus::Skipped)
            .with_times(None, Some(30))
            .with_skip(SkipInfo {
                skip_condition: "<+false>".to_string(),
                evaluated_condition: true,
            });
        let patch = project_node_event(&event).unwrap();

        assert_eq!(patch.get("layoutNodeMap.s2.endTs"), Some(&json!(30)));
        assert_eq!(
            patch.get("layoutNodeMap.s2.skipInfo"),
            Some(&json!({"skipCondition": "<+false>", "evaluatedCondition": true}))
        );
        assert!(patch.get("layoutNodeMap.s2.failureInfo").is_none());
    }

    #[test]
    fn test_pipeline_failure_patch() {
        let event = NodeExecutionEvent::new(
            "p-exec",
            Ambiance::new("exec-1").with_level(pipeline_level()),
            ExecutionStatus::Aborted,
        )
        .with_times(Some(1), Some(2))
        .with_failure(FailureInfo::new("aborted by user"));
        let patch = project_node_event(&event).unwrap();

        assert_eq!(patch.get("status"), Some(&json!("ABORTED")));
        assert_eq!(patch.get("endTs"), Some(&json!(2)));
        assert_eq!(
            patch.get("executionErrorInfo"),
            Some(&json!({"message": "aborted by user"}))
        );
    }

    #[test]
    fn test_barrier_flags_owning_stage() {
        let event = NodeExecutionEvent::new(
            "barrier-exec",
            Ambiance::new("exec-1")
                .with_level(pipeline_level())
                .with_level(stage_level("s3"))
                .with_level(Level::new("b", "b-exec", "sync", StepType::barrier(), groups::STEP)),
            ExecutionStatus::Running,
        );
        let patch = project_node_event(&event).unwrap();

        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("layoutNodeMap.s3.barrierFound"), Some(&json!(true)));
    }

    #[test]
    fn test_plain_step_is_ignored() {
        let event = NodeExecutionEvent::new(
            "step-exec",
            Ambiance::new("exec-1")
                .with_level(stage_level("s1"))
                .with_level(Level::new(
                    "st",
                    "st-exec",
                    "shell",
                    StepType::new("SHELL", StepCategory::Step),
                    groups::STEP,
                )),
            ExecutionStatus::Success,
        );
        assert!(project_node_event(&event).unwrap().is_empty());
        assert!(project_node_event(&NodeExecutionEvent::new(
            "x",
            Ambiance::new("exec-1"),
            ExecutionStatus::Success
        ))
        .unwrap()
        .is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sibling_updates_are_not_lost() {
        let store = Arc::new(InMemorySummaryStore::new());
        let mut summary = PipelineExecutionSummary::new("exec-1", "deploy");
        for i in 0..16 {
            summary = summary.with_layout_entry(format!("s{i}"), StageLayoutEntry::new(format!("s{i}")));
        }
        store.create(summary).await.unwrap();

        let projector = Arc::new(ExecutionSummaryProjector::new(store.clone()));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let projector = Arc::clone(&projector);
                tokio::spawn(async move {
                    let event = stage_event(&format!("s{i}"), ExecutionStatus::Success)
                        .with_times(Some(i), Some(i + 1));
                    projector.handle(&event).await
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap());
        }

        let summary = store.get("exec-1").await.unwrap().unwrap();
        assert_eq!(summary.layout_node_map.len(), 16);
        assert!(summary
            .layout_node_map
            .values()
            .all(|entry| entry.status == ExecutionStatus::Success && entry.end_ts.is_some()));
        assert_eq!(summary.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_patch_of_unknown_summary_fails() {
        let projector = ExecutionSummaryProjector::new(Arc::new(InMemorySummaryStore::new()));
        let err = projector
            .handle(&stage_event("s1", ExecutionStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::errors::RetryError::UpstreamUnavailable(_)));
    }
}
