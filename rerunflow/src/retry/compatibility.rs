//! Retry compatibility between the executed and the current definition.

use tracing::{debug, warn};

use crate::definition::FqnIndex;

/// Message shown when the stored pipeline no longer matches the execution.
pub const INCOMPATIBLE_PIPELINE_MESSAGE: &str = "The pipeline has been updated. Adding, deleting or changing the name of the stage identifiers is not allowed for retry.";

/// Returns true if an execution of `previous_yaml` may be retried against `current_yaml`.
///
/// The two definitions are compatible iff their ordered lists of stage FQNs
/// are identical. Renaming a stage's display name, adding steps or editing
/// any non-stage content keeps them compatible; adding, removing, renaming
/// or reordering stages (inside parallel groups too) does not.
///
/// Empty or unparseable input on either side is reported as incompatible.
#[must_use]
pub fn is_retry_compatible(previous_yaml: &str, current_yaml: &str) -> bool {
    if previous_yaml.trim().is_empty() || current_yaml.trim().is_empty() {
        debug!("Retry compatibility check received an empty definition");
        return false;
    }

    let (previous, current) = match (
        FqnIndex::from_yaml(previous_yaml),
        FqnIndex::from_yaml(current_yaml),
    ) {
        (Ok(previous), Ok(current)) => (previous, current),
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "Could not index pipeline definition for retry");
            return false;
        }
    };

    let previous_stages = previous.stage_fqns();
    let current_stages = current.stage_fqns();
    let compatible = previous_stages == current_stages;

    debug!(
        compatible,
        previous_stage_count = previous_stages.len(),
        current_stage_count = current_stages.len(),
        "Checked retry compatibility"
    );

    compatible
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r"
pipeline:
  identifier: deploy
  stages:
    - stage:
        identifier: s1
        name: Build
        spec:
          steps:
            - step:
                identifier: compile
    - stage:
        identifier: s2
        name: Test
    - parallel:
        - stage:
            identifier: s3
        - stage:
            identifier: s4
";

    fn edited(from: &str, to: &str) -> String {
        BASE.replacen(from, to, 1)
    }

    #[test]
    fn test_identical_is_compatible() {
        assert!(is_retry_compatible(BASE, BASE));
    }

    #[test]
    fn test_empty_is_incompatible() {
        assert!(!is_retry_compatible("", BASE));
        assert!(!is_retry_compatible(BASE, "   "));
        assert!(!is_retry_compatible("pipeline: [", BASE));
    }

    #[test]
    fn test_stage_added_is_incompatible() {
        let current = format!("{BASE}    - stage:\n        identifier: s5\n");
        assert!(!is_retry_compatible(BASE, &current));
    }

    #[test]
    fn test_stage_removed_is_incompatible() {
        let current = format!("{BASE}    - stage:\n        identifier: s5\n");
        assert!(!is_retry_compatible(&current, BASE));
    }

    #[test]
    fn test_stage_identifier_renamed_is_incompatible() {
        assert!(!is_retry_compatible(BASE, &edited("identifier: s2", "identifier: s2b")));
    }

    #[test]
    fn test_stage_shuffle_is_incompatible() {
        let shuffled = BASE
            .replacen("identifier: s1", "identifier: TMP", 1)
            .replacen("identifier: s2", "identifier: s1", 1)
            .replacen("identifier: TMP", "identifier: s2", 1);
        assert!(!is_retry_compatible(BASE, &shuffled));
    }

    #[test]
    fn test_parallel_member_added_is_incompatible() {
        let current = edited(
            "            identifier: s4\n",
            "            identifier: s4\n        - stage:\n            identifier: s6\n",
        );
        assert!(!is_retry_compatible(BASE, &current));
    }

    #[test]
    fn test_parallel_shuffle_is_incompatible() {
        let shuffled = BASE
            .replacen("identifier: s3", "identifier: TMP", 1)
            .replacen("identifier: s4", "identifier: s3", 1)
            .replacen("identifier: TMP", "identifier: s4", 1);
        assert!(!is_retry_compatible(BASE, &shuffled));
    }

    #[test]
    fn test_stage_name_renamed_is_compatible() {
        assert!(is_retry_compatible(BASE, &edited("name: Test", "name: Integration")));
    }

    #[test]
    fn test_step_added_is_compatible() {
        let current = edited(
            "                identifier: compile\n",
            "                identifier: compile\n            - step:\n                identifier: package\n",
        );
        assert!(is_retry_compatible(BASE, &current));
    }
}
