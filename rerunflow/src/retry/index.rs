//! Retry index: ledger entries grouped by their structural successor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::core::ExecutionStatus;
use crate::errors::{Result, RetryError};

/// Message used when an execution has no retained stage ledger.
pub const NO_STAGE_DETAILS_MESSAGE: &str =
    "No stage execution details were retained for this execution. It cannot be retried.";

/// A stage ledger entry of a prior execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStageInfo {
    /// Stage identifier.
    pub identifier: String,
    /// Stage display name.
    #[serde(default)]
    pub name: String,
    /// Last recorded status of the stage.
    pub status: ExecutionStatus,
    /// Identifier of the next stage in execution order; empty for the last.
    #[serde(default)]
    pub next_id: String,
    /// Identifier of the enclosing group, if any.
    #[serde(default)]
    pub parent_id: String,
    /// Epoch millis at which the stage started.
    #[serde(default)]
    pub created_at: i64,
}

impl RetryStageInfo {
    /// Creates a ledger entry.
    #[must_use]
    pub fn new(identifier: impl Into<String>, status: ExecutionStatus) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier,
            status,
            next_id: String::new(),
            parent_id: String::new(),
            created_at: 0,
        }
    }

    /// Sets the next stage identifier.
    #[must_use]
    pub fn with_next_id(mut self, next_id: impl Into<String>) -> Self {
        self.next_id = next_id.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the enclosing group identifier.
    #[must_use]
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = parent_id.into();
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Ledger entries that share the same successor.
///
/// A group with more than one member is a parallel group boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryGroup {
    /// Member entries, in ledger order.
    pub members: Vec<RetryStageInfo>,
}

impl RetryGroup {
    /// Returns the shared successor identifier.
    #[must_use]
    pub fn next_id(&self) -> &str {
        self.members.first().map_or("", |m| m.next_id.as_str())
    }

    /// Returns true if the group spans more than one stage.
    #[must_use]
    pub fn is_parallel(&self) -> bool {
        self.members.len() > 1
    }

    /// Returns true if a member has `identifier`.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.members.iter().any(|m| m.identifier == identifier)
    }

    /// Returns the member identifiers, in ledger order.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.identifier.as_str()).collect()
    }
}

/// Ordered retry groups of an execution; the first group is the earliest
/// resumable point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryIndex {
    groups: Vec<RetryGroup>,
}

impl RetryIndex {
    /// Returns the groups in execution order.
    #[must_use]
    pub fn groups(&self) -> &[RetryGroup] {
        &self.groups
    }

    /// Consumes the index, returning its groups.
    #[must_use]
    pub fn into_groups(self) -> Vec<RetryGroup> {
        self.groups
    }

    /// Returns the position and group containing `identifier`.
    #[must_use]
    pub fn group_of(&self, identifier: &str) -> Option<(usize, &RetryGroup)> {
        self.groups
            .iter()
            .enumerate()
            .find(|(_, group)| group.contains(identifier))
    }

    /// Returns the number of groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no groups.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Groups ledger entries by `next_id`, in order of first appearance.
///
/// Ledger order is preserved within each group. The empty `next_id` is an
/// ordinary key denoting the last executed stages.
///
/// # Errors
///
/// Returns [`RetryError::NotResumable`] for an empty ledger.
pub fn build_retry_index(entries: &[RetryStageInfo]) -> Result<RetryIndex> {
    if entries.is_empty() {
        return Err(RetryError::not_resumable(NO_STAGE_DETAILS_MESSAGE));
    }

    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<RetryGroup> = Vec::new();

    for entry in entries {
        let position = *positions.entry(entry.next_id.as_str()).or_insert_with(|| {
            groups.push(RetryGroup::default());
            groups.len() - 1
        });
        groups[position].members.push(entry.clone());
    }

    debug!(
        stage_count = entries.len(),
        group_count = groups.len(),
        "Built retry index"
    );

    Ok(RetryIndex { groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ledger() -> Vec<RetryStageInfo> {
        vec![
            RetryStageInfo::new("s1", ExecutionStatus::Success).with_next_id("s2"),
            RetryStageInfo::new("s2", ExecutionStatus::Success).with_next_id("s3"),
            RetryStageInfo::new("s3", ExecutionStatus::Failed).with_next_id("s5"),
            RetryStageInfo::new("s4", ExecutionStatus::Success).with_next_id("s5"),
            RetryStageInfo::new("s5", ExecutionStatus::NotStarted),
        ]
    }

    #[test]
    fn test_groups_by_next_id() {
        let index = build_retry_index(&ledger()).unwrap();

        let shape: Vec<Vec<&str>> = index.groups().iter().map(RetryGroup::identifiers).collect();
        assert_eq!(shape, vec![vec!["s1"], vec!["s2"], vec!["s3", "s4"], vec!["s5"]]);
        assert!(index.groups()[2].is_parallel());
        assert_eq!(index.groups()[3].next_id(), "");
    }

    #[test]
    fn test_two_stage_scenario() {
        let entries = vec![
            RetryStageInfo::new("A", ExecutionStatus::Success).with_next_id("B"),
            RetryStageInfo::new("B", ExecutionStatus::Failed),
        ];
        let index = build_retry_index(&entries).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.groups()[0].identifiers(), vec!["A"]);
        assert_eq!(index.groups()[1].identifiers(), vec!["B"]);
    }

    #[test]
    fn test_first_appearance_order_with_interleaving() {
        let entries = vec![
            RetryStageInfo::new("a", ExecutionStatus::Success).with_next_id("x"),
            RetryStageInfo::new("b", ExecutionStatus::Success).with_next_id("y"),
            RetryStageInfo::new("c", ExecutionStatus::Success).with_next_id("x"),
        ];
        let index = build_retry_index(&entries).unwrap();

        assert_eq!(index.groups()[0].identifiers(), vec!["a", "c"]);
        assert_eq!(index.groups()[1].identifiers(), vec!["b"]);
    }

    #[test]
    fn test_idempotent() {
        let first = build_retry_index(&ledger()).unwrap();
        let second = build_retry_index(&ledger()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_ledger_not_resumable() {
        let err = build_retry_index(&[]).unwrap_err();
        assert!(matches!(err, RetryError::NotResumable(_)));
        assert!(err.is_user_facing());
    }

    #[test]
    fn test_group_of() {
        let index = build_retry_index(&ledger()).unwrap();
        let (position, group) = index.group_of("s4").unwrap();
        assert_eq!(position, 2);
        assert!(group.contains("s3"));
        assert!(index.group_of("missing").is_none());
    }

    #[test]
    fn test_ledger_entry_serde() {
        let json = serde_json::json!({
            "identifier": "s1",
            "name": "Build",
            "status": "APPROVALREJECTED",
            "nextId": "s2",
            "parentId": "",
            "createdAt": 10
        });
        let entry: RetryStageInfo = serde_json::from_value(json).unwrap();
        assert_eq!(entry.status, ExecutionStatus::ApprovalRejected);
        assert_eq!(entry.next_id, "s2");
    }
}
