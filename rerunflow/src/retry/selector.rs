//! Resolution of the stages a retry re-runs.

use std::collections::HashSet;
use tracing::{debug, warn};

use super::index::{RetryGroup, RetryIndex};
use crate::errors::{Result, RetryError};

/// Message for narrowing requests outside the target group.
pub const ONLY_FAILED_OUTSIDE_GROUP_MESSAGE: &str =
    "run only failed stages is applicable only for failed parallel group stages";
/// Message for a target group with no failed member.
pub const NO_FAILED_STAGE_MESSAGE: &str = "no failed stage found in parallel group";
/// Message for a retry request without stages.
pub const NO_STAGE_SELECTED_MESSAGE: &str = "At least one stage must be selected for retry";

/// Narrows a retry group to its failed members.
///
/// Every requested identifier must belong to `group`. The result holds the
/// members whose status is a retryable failure, in ledger order, regardless
/// of which members were literally requested.
///
/// # Errors
///
/// Returns [`RetryError::InvalidRequest`] if nothing was requested or a
/// requested identifier is not a member of `group`, and
/// [`RetryError::NotResumable`] if no member failed.
pub fn select_failed_stages(group: &RetryGroup, requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Err(RetryError::invalid_request(NO_STAGE_SELECTED_MESSAGE));
    }
    if let Some(outsider) = requested.iter().find(|id| !group.contains(id)) {
        warn!(stage = %outsider, "Requested stage is not in the target retry group");
        return Err(RetryError::invalid_request(ONLY_FAILED_OUTSIDE_GROUP_MESSAGE)
            .with_context("stage", outsider.as_str()));
    }

    let failed: Vec<String> = group
        .members
        .iter()
        .filter(|member| member.status.is_retryable_failure())
        .map(|member| member.identifier.clone())
        .collect();

    if failed.is_empty() {
        return Err(RetryError::not_resumable(NO_FAILED_STAGE_MESSAGE));
    }

    debug!(failed = ?failed, "Selected failed stages of retry group");
    Ok(failed)
}

/// Resolves the final set of stages to re-run for a retry request.
///
/// All requested stages must belong to a single retry group. When
/// `run_all_stages` is false, `only_failed_narrowing` is enabled and the
/// group is a parallel group, the set is narrowed to the group's failed
/// members. Otherwise the requested stages are returned in ledger order.
///
/// # Errors
///
/// Returns [`RetryError::InvalidRequest`] for an empty request, unknown
/// stages or stages spread over several groups, plus any error of
/// [`select_failed_stages`].
pub fn resolve_retry_stages(
    index: &RetryIndex,
    requested: &[String],
    run_all_stages: bool,
    only_failed_narrowing: bool,
) -> Result<Vec<String>> {
    let Some(first) = requested.first() else {
        return Err(RetryError::invalid_request(NO_STAGE_SELECTED_MESSAGE));
    };

    let (position, group) = index.group_of(first).ok_or_else(|| {
        RetryError::invalid_request(format!(
            "Stage {first} was not part of the previous execution"
        ))
        .with_context("stage", first.as_str())
    })?;

    for identifier in &requested[1..] {
        match index.group_of(identifier) {
            Some((other, _)) if other == position => {}
            Some(_) => {
                return Err(RetryError::invalid_request(
                    "Stages selected for retry must belong to the same parallel group",
                )
                .with_context("stage", identifier.as_str()));
            }
            None => {
                return Err(RetryError::invalid_request(format!(
                    "Stage {identifier} was not part of the previous execution"
                ))
                .with_context("stage", identifier.as_str()));
            }
        }
    }

    if !run_all_stages && only_failed_narrowing && group.is_parallel() {
        return select_failed_stages(group, requested);
    }

    let wanted: HashSet<&str> = requested.iter().map(String::as_str).collect();
    Ok(group
        .identifiers()
        .into_iter()
        .filter(|id| wanted.contains(id))
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionStatus;
    use crate::retry::index::{build_retry_index, RetryStageInfo};
    use pretty_assertions::assert_eq;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    fn group(statuses: &[(&str, ExecutionStatus)]) -> RetryGroup {
        RetryGroup {
            members: statuses
                .iter()
                .map(|(id, status)| RetryStageInfo::new(*id, *status).with_next_id("next"))
                .collect(),
        }
    }

    #[test]
    fn test_returns_every_failed_member() {
        let group = group(&[
            ("C", ExecutionStatus::Failed),
            ("D", ExecutionStatus::Failed),
        ]);
        let selected = select_failed_stages(&group, &ids(&["C"])).unwrap();
        assert_eq!(selected, ids(&["C", "D"]));
    }

    #[test]
    fn test_filters_by_status() {
        let group = group(&[
            ("a", ExecutionStatus::Success),
            ("b", ExecutionStatus::Expired),
            ("c", ExecutionStatus::IgnoreFailed),
            ("d", ExecutionStatus::ApprovalRejected),
            ("e", ExecutionStatus::Aborted),
        ]);
        let selected = select_failed_stages(&group, &ids(&["a"])).unwrap();
        assert_eq!(selected, ids(&["b", "d", "e"]));
    }

    #[test]
    fn test_request_outside_group() {
        let group = group(&[("a", ExecutionStatus::Failed)]);
        let err = select_failed_stages(&group, &ids(&["z"])).unwrap_err();
        assert!(matches!(err, RetryError::InvalidRequest(_)));
        assert_eq!(err.to_string(), ONLY_FAILED_OUTSIDE_GROUP_MESSAGE);
    }

    #[test]
    fn test_empty_request_is_invalid() {
        let group = group(&[("a", ExecutionStatus::Failed)]);
        let err = select_failed_stages(&group, &[]).unwrap_err();
        assert!(matches!(err, RetryError::InvalidRequest(_)));
        assert_eq!(err.to_string(), NO_STAGE_SELECTED_MESSAGE);
    }

    #[test]
    fn test_all_succeeded_not_resumable() {
        let group = group(&[
            ("a", ExecutionStatus::Success),
            ("b", ExecutionStatus::IgnoreFailed),
        ]);
        let err = select_failed_stages(&group, &ids(&["a"])).unwrap_err();
        assert!(matches!(err, RetryError::NotResumable(_)));
        assert_eq!(err.to_string(), NO_FAILED_STAGE_MESSAGE);
    }

    fn parallel_index() -> RetryIndex {
        build_retry_index(&[
            RetryStageInfo::new("A", ExecutionStatus::Success).with_next_id("C"),
            RetryStageInfo::new("C", ExecutionStatus::Failed).with_next_id("E"),
            RetryStageInfo::new("D", ExecutionStatus::Failed).with_next_id("E"),
            RetryStageInfo::new("X", ExecutionStatus::Success).with_next_id("E"),
            RetryStageInfo::new("E", ExecutionStatus::NotStarted),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_narrows_parallel_group() {
        let resolved = resolve_retry_stages(&parallel_index(), &ids(&["C"]), false, true).unwrap();
        assert_eq!(resolved, ids(&["C", "D"]));
    }

    #[test]
    fn test_resolve_run_all_keeps_request() {
        let resolved =
            resolve_retry_stages(&parallel_index(), &ids(&["X", "C"]), true, true).unwrap();
        assert_eq!(resolved, ids(&["C", "X"]));
    }

    #[test]
    fn test_resolve_narrowing_disabled() {
        let resolved = resolve_retry_stages(&parallel_index(), &ids(&["C"]), false, false).unwrap();
        assert_eq!(resolved, ids(&["C"]));
    }

    #[test]
    fn test_resolve_single_stage_group_is_not_narrowed() {
        let resolved = resolve_retry_stages(&parallel_index(), &ids(&["A"]), false, true).unwrap();
        assert_eq!(resolved, ids(&["A"]));
    }

    #[test]
    fn test_resolve_rejects_bad_requests() {
        let index = parallel_index();

        let empty = resolve_retry_stages(&index, &[], true, true).unwrap_err();
        assert!(matches!(empty, RetryError::InvalidRequest(_)));

        let unknown = resolve_retry_stages(&index, &ids(&["nope"]), true, true).unwrap_err();
        assert!(unknown.to_string().contains("nope"));

        let spread = resolve_retry_stages(&index, &ids(&["A", "C"]), true, true).unwrap_err();
        assert!(matches!(spread, RetryError::InvalidRequest(_)));
    }
}
