//! Stage-skip planning: splice the previous processed tree into the current one.
//!
//! The planner walks the previous execution's top-level stage list in order.
//! Stages before the first retried entry are carried forward verbatim (with
//! their compiled-tree uuids), the first entry holding a retried stage keeps
//! only the uuids of the previous tree, and everything after it comes from
//! the current tree untouched. Neither input is mutated.

use std::collections::HashSet;
use tracing::{debug, error};

use crate::definition::{PipelineDefinition, StageEntry, StageNode};
use crate::errors::{Result, RetryError};

/// The outcome of stage-skip planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    definition: PipelineDefinition,
    skipped: Vec<String>,
    retried: Vec<String>,
}

impl Partition {
    /// Returns the rewritten definition.
    #[must_use]
    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Returns the identifiers of carried-forward stages, in execution order.
    #[must_use]
    pub fn skipped_identifiers(&self) -> &[String] {
        &self.skipped
    }

    /// Returns the identifiers of re-run stages found before iteration stopped.
    #[must_use]
    pub fn retried_identifiers(&self) -> &[String] {
        &self.retried
    }

    /// Renders the rewritten processed YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Yaml`] if rendering fails.
    pub fn to_yaml(&self) -> Result<String> {
        self.definition.to_yaml()
    }

    /// Consumes the partition, returning the definition and skipped identifiers.
    #[must_use]
    pub fn into_parts(self) -> (PipelineDefinition, Vec<String>) {
        (self.definition, self.skipped)
    }
}

/// Partitions two processed YAML documents into skipped and retried stages.
///
/// # Errors
///
/// See [`partition_definitions`]; additionally returns parse errors for
/// either document.
pub fn partition(
    previous_processed_yaml: &str,
    current_processed_yaml: &str,
    retry_stages: &[String],
) -> Result<Partition> {
    let previous = PipelineDefinition::parse(previous_processed_yaml)?;
    let current = PipelineDefinition::parse(current_processed_yaml)?;
    partition_definitions(&previous, &current, retry_stages)
}

/// Partitions two parsed definitions into skipped and retried stages.
///
/// With an empty `retry_stages` every previous entry is carried forward.
///
/// # Errors
///
/// Returns [`RetryError::InvalidRequest`] if a retry stage is not part of
/// `current`, and [`RetryError::Invariant`] if the entries at the same
/// position of both trees hold different stages.
pub fn partition_definitions(
    previous: &PipelineDefinition,
    current: &PipelineDefinition,
    retry_stages: &[String],
) -> Result<Partition> {
    if let Some(unknown) = retry_stages.iter().find(|id| !current.contains_stage(id)) {
        return Err(RetryError::invalid_request(format!(
            "Stage {unknown} does not exist in the pipeline"
        ))
        .with_context("stage", unknown.as_str()));
    }

    let retry: HashSet<&str> = retry_stages.iter().map(String::as_str).collect();
    let mut entries = current.entries().to_vec();
    let mut skipped = Vec::new();
    let mut retried = Vec::new();

    for (position, previous_entry) in previous.entries().iter().enumerate() {
        let current_entry = current
            .entries()
            .get(position)
            .filter(|current_entry| previous_entry.same_shape(current_entry))
            .ok_or_else(|| shape_mismatch(position, previous_entry, current.entries().get(position)))?;

        let touches_retry = previous_entry
            .identifiers()
            .iter()
            .any(|id| retry.contains(id));

        if !touches_retry {
            skipped.extend(previous_entry.identifiers().into_iter().map(String::from));
            entries[position] = previous_entry.clone();
            continue;
        }

        entries[position] = match (previous_entry, current_entry) {
            (StageEntry::Stage(prev), StageEntry::Stage(curr)) => {
                retried.push(prev.identifier.clone());
                StageEntry::Stage(curr.with_uuid(prev.uuid.as_deref()))
            }
            (StageEntry::Parallel(prev), StageEntry::Parallel(curr)) => {
                let members: Vec<StageNode> = prev
                    .members
                    .iter()
                    .zip(&curr.members)
                    .map(|(prev_member, curr_member)| {
                        if retry.contains(prev_member.identifier.as_str()) {
                            retried.push(prev_member.identifier.clone());
                            curr_member.with_uuid(prev_member.uuid.as_deref())
                        } else {
                            skipped.push(prev_member.identifier.clone());
                            prev_member.clone()
                        }
                    })
                    .collect();
                StageEntry::Parallel(curr.rebuild(members, prev.uuid.as_deref()))
            }
            _ => return Err(shape_mismatch(position, previous_entry, Some(current_entry))),
        };
        break;
    }

    debug!(
        skipped = ?skipped,
        retried = ?retried,
        "Partitioned stages for retry"
    );

    Ok(Partition {
        definition: current.with_entries(entries),
        skipped,
        retried,
    })
}

fn shape_mismatch(
    position: usize,
    previous: &StageEntry,
    current: Option<&StageEntry>,
) -> RetryError {
    let previous_ids = previous.identifiers().join(",");
    let current_ids = current.map_or_else(String::new, |entry| entry.identifiers().join(","));
    error!(
        position,
        previous = %previous_ids,
        current = %current_ids,
        "Stage entries of previous and current tree diverge"
    );
    RetryError::invariant(format!(
        "Stage entry at position {position} differs between previous and current tree"
    ))
    .with_context("previous", previous_ids)
    .with_context("current", current_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_yaml::Value;

    fn processed(prefix: &str) -> String {
        format!(
            r"
pipeline:
  identifier: golden
  stages:
    - stage:
        identifier: stage1
        __uuid: {prefix}-1
        spec:
          note: {prefix}
    - stage:
        identifier: stage2
        __uuid: {prefix}-2
    - __uuid: {prefix}-p1
      parallel:
        - stage:
            identifier: stage3
            __uuid: {prefix}-3
        - stage:
            identifier: stage4
            __uuid: {prefix}-4
        - stage:
            identifier: stage5
            __uuid: {prefix}-5
    - stage:
        identifier: stage6
        __uuid: {prefix}-6
    - stage:
        identifier: stage7
        __uuid: {prefix}-7
    - __uuid: {prefix}-p2
      parallel:
        - stage:
            identifier: stage8
            __uuid: {prefix}-8
        - stage:
            identifier: stage9
            __uuid: {prefix}-9
"
        )
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn run(retry: &[&str]) -> Partition {
        partition(&processed("prev"), &processed("curr"), &ids(retry)).unwrap()
    }

    fn uuids(partition: &Partition) -> Vec<Option<String>> {
        partition
            .definition()
            .entries()
            .iter()
            .flat_map(|entry| match entry {
                StageEntry::Stage(stage) => vec![stage.uuid.clone()],
                StageEntry::Parallel(group) => std::iter::once(group.uuid.clone())
                    .chain(group.members.iter().map(|m| m.uuid.clone()))
                    .collect(),
            })
            .collect()
    }

    #[test]
    fn test_retry_later_stage_skips_prefix() {
        let result = run(&["stage7"]);
        assert_eq!(
            result.skipped_identifiers(),
            ids(&["stage1", "stage2", "stage3", "stage4", "stage5", "stage6"])
        );
        assert_eq!(result.retried_identifiers(), ids(&["stage7"]));
    }

    #[test]
    fn test_retry_last_parallel_member() {
        let result = run(&["stage9"]);
        assert_eq!(
            result.skipped_identifiers(),
            ids(&["stage1", "stage2", "stage3", "stage4", "stage5", "stage6", "stage7", "stage8"])
        );
    }

    #[test]
    fn test_retry_some_parallel_members() {
        let result = run(&["stage3", "stage5"]);
        assert_eq!(
            result.skipped_identifiers(),
            ids(&["stage1", "stage2", "stage4"])
        );
        assert_eq!(result.retried_identifiers(), ids(&["stage3", "stage5"]));
    }

    #[test]
    fn test_retry_whole_parallel_group() {
        let result = run(&["stage3", "stage4", "stage5"]);
        assert_eq!(result.skipped_identifiers(), ids(&["stage1", "stage2"]));
    }

    #[test]
    fn test_retry_first_stage_skips_nothing() {
        let result = run(&["stage1"]);
        assert!(result.skipped_identifiers().is_empty());
        assert_eq!(uuids(&result)[0].as_deref(), Some("prev-1"));
        assert_eq!(uuids(&result)[1].as_deref(), Some("curr-2"));
    }

    #[test]
    fn test_uuid_layout_after_splice() {
        let result = run(&["stage3", "stage5"]);
        let expected: Vec<Option<String>> = [
            "prev-1", "prev-2", "prev-p1", "prev-3", "prev-4", "prev-5", "curr-6", "curr-7",
            "curr-p2", "curr-8", "curr-9",
        ]
        .iter()
        .map(|u| Some((*u).to_string()))
        .collect();
        assert_eq!(uuids(&result), expected);
    }

    #[test]
    fn test_retried_stage_keeps_current_body() {
        let result = run(&["stage1"]);
        let StageEntry::Stage(stage) = &result.definition().entries()[0] else {
            panic!("expected a stage");
        };
        let note = stage.item().get("stage").and_then(|s| s.get("spec")).and_then(|s| s.get("note"));
        assert_eq!(note, Some(&Value::from("curr")));
    }

    #[test]
    fn test_skipped_stage_carries_previous_body() {
        let result = run(&["stage2"]);
        let StageEntry::Stage(stage) = &result.definition().entries()[0] else {
            panic!("expected a stage");
        };
        let note = stage.item().get("stage").and_then(|s| s.get("spec")).and_then(|s| s.get("note"));
        assert_eq!(note, Some(&Value::from("prev")));
    }

    #[test]
    fn test_empty_retry_overlays_every_uuid() {
        let result = run(&[]);
        assert_eq!(result.skipped_identifiers().len(), 9);
        assert!(uuids(&result)
            .iter()
            .all(|u| u.as_deref().is_some_and(|u| u.starts_with("prev-"))));
    }

    #[test]
    fn test_skipped_is_contiguous_prefix() {
        let cases: [(&[&str], &[&str]); 4] = [
            (&["stage2"], &["stage1"]),
            (&["stage4"], &["stage1", "stage2", "stage3", "stage5"]),
            (&["stage6"], &["stage1", "stage2", "stage3", "stage4", "stage5"]),
            (
                &["stage8", "stage9"],
                &["stage1", "stage2", "stage3", "stage4", "stage5", "stage6", "stage7"],
            ),
        ];

        for (retry, expected) in cases {
            let result = run(retry);
            assert_eq!(result.skipped_identifiers(), ids(expected));
        }
    }

    #[test]
    fn test_rendered_yaml_reparses() {
        let result = run(&["stage6"]);
        let reparsed = PipelineDefinition::parse(&result.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed.stage_identifiers().len(), 9);
        assert_eq!(reparsed.entries()[3].uuid(), Some("prev-6"));
    }

    #[test]
    fn test_unknown_retry_stage() {
        let err = partition(&processed("a"), &processed("b"), &ids(&["ghost"])).unwrap_err();
        assert!(matches!(err, RetryError::InvalidRequest(_)));
    }

    #[test]
    fn test_shape_mismatch_is_invariant() {
        let previous = processed("a");
        let current = processed("b").replace("identifier: stage2", "identifier: stageX");
        let err = partition(&previous, &current, &ids(&["stage7"])).unwrap_err();
        assert!(matches!(err, RetryError::Invariant(_)));
        assert!(!err.is_user_facing());
    }
}
