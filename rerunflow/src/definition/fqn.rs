//! Fully-qualified names of nodes in a pipeline definition tree.
//!
//! An FQN is the ordered list of path segments leading to a node. The walk
//! skips synthetic keys (`__uuid`) and `parallel` wrappers, and list items
//! wrapped as `stage`, `stepGroup` or `step` contribute their `identifier`
//! instead of their list position. Moving a stage into or out of a parallel
//! group therefore keeps its FQN, while its position in the ordered index
//! still changes.

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fmt;

use super::keys;
use crate::errors::Result;

/// An ordered path of identifiers locating a node in a definition tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fqn(Vec<String>);

impl Fqn {
    /// Creates an FQN from its segments.
    #[must_use]
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parses a dotted FQN (e.g., `pipeline.stages.build`).
    #[must_use]
    pub fn parse(dotted: &str) -> Self {
        Self(
            dotted
                .split('.')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    /// FQN of a top-level stage.
    #[must_use]
    pub fn for_stage(identifier: &str) -> Self {
        Self(vec![
            keys::PIPELINE.to_string(),
            keys::STAGES.to_string(),
            identifier.to_string(),
        ])
    }

    /// Returns the child FQN with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }

    /// Returns the path segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Returns the terminal segment.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Returns true if `self` equals `other` or is one of its ancestors.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// What kind of node an FQN addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FqnKind {
    /// A stage; the terminal segment is the stage identifier.
    Stage,
    /// A step group.
    StepGroup,
    /// A step.
    Step,
    /// A scalar field.
    Field,
}

/// Ordered index of every addressable node in a definition tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FqnIndex {
    entries: Vec<(Fqn, FqnKind)>,
}

impl FqnIndex {
    /// Builds the index by walking `root` depth-first in document order.
    #[must_use]
    pub fn build(root: &Value) -> Self {
        let mut entries = Vec::new();
        walk(root, &Fqn::default(), &mut entries);
        Self { entries }
    }

    /// Parses `yaml` and builds its index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::RetryError::Yaml`] for malformed YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(yaml)?;
        Ok(Self::build(&root))
    }

    /// Returns every indexed FQN with its kind, in document order.
    #[must_use]
    pub fn entries(&self) -> &[(Fqn, FqnKind)] {
        &self.entries
    }

    /// Returns the FQNs whose terminal segment is a stage identifier.
    #[must_use]
    pub fn stage_fqns(&self) -> Vec<&Fqn> {
        self.of_kind(FqnKind::Stage)
    }

    /// Returns the FQNs of the given kind, in document order.
    #[must_use]
    pub fn of_kind(&self, kind: FqnKind) -> Vec<&Fqn> {
        self.entries
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(fqn, _)| fqn)
            .collect()
    }

    /// Returns the number of indexed nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const WRAPPERS: [(&str, FqnKind); 3] = [
    (keys::STAGE, FqnKind::Stage),
    (keys::STEP_GROUP, FqnKind::StepGroup),
    (keys::STEP, FqnKind::Step),
];

fn walk(value: &Value, path: &Fqn, out: &mut Vec<(Fqn, FqnKind)>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = key.as_str() else { continue };
                if key == keys::UUID {
                    continue;
                }
                walk(child, &path.child(key), out);
            }
        }
        Value::Sequence(items) => {
            for (position, item) in items.iter().enumerate() {
                walk_item(item, path, position, out);
            }
        }
        Value::Tagged(tagged) => walk(&tagged.value, path, out),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            out.push((path.clone(), FqnKind::Field));
        }
    }
}

fn walk_item(item: &Value, path: &Fqn, position: usize, out: &mut Vec<(Fqn, FqnKind)>) {
    if let Some(members) = item.get(keys::PARALLEL).filter(|m| m.is_sequence()) {
        walk(members, path, out);
        return;
    }

    for (wrapper, kind) in WRAPPERS {
        let Some(inner) = item.get(wrapper) else { continue };
        if let Some(identifier) = inner.get(keys::IDENTIFIER).and_then(Value::as_str) {
            let fqn = path.child(identifier);
            out.push((fqn.clone(), kind));
            walk(inner, &fqn, out);
            return;
        }
    }

    match item.get(keys::IDENTIFIER).and_then(Value::as_str) {
        Some(identifier) => walk(item, &path.child(identifier), out),
        None => walk(item, &path.child(&position.to_string()), out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r"
pipeline:
  identifier: deploy
  stages:
    - stage:
        identifier: build
        __uuid: u1
        spec:
          execution:
            steps:
              - step:
                  identifier: compile
              - stepGroup:
                  identifier: checks
                  steps:
                    - parallel:
                        - step:
                            identifier: lint
    - __uuid: u2
      parallel:
        - stage:
            identifier: qa
        - stage:
            identifier: perf
";

    fn stage_strings(index: &FqnIndex) -> Vec<String> {
        index.stage_fqns().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_stage_fqns_skip_parallel_wrapper() {
        let index = FqnIndex::from_yaml(YAML).unwrap();
        assert_eq!(
            stage_strings(&index),
            vec![
                "pipeline.stages.build",
                "pipeline.stages.qa",
                "pipeline.stages.perf"
            ]
        );
    }

    #[test]
    fn test_steps_and_groups_indexed() {
        let index = FqnIndex::from_yaml(YAML).unwrap();
        let steps: Vec<String> = index
            .of_kind(FqnKind::Step)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            steps,
            vec![
                "pipeline.stages.build.spec.execution.steps.compile",
                "pipeline.stages.build.spec.execution.steps.checks.steps.lint"
            ]
        );
        assert_eq!(index.of_kind(FqnKind::StepGroup).len(), 1);
    }

    #[test]
    fn test_uuid_is_not_indexed() {
        let index = FqnIndex::from_yaml(YAML).unwrap();
        assert!(index
            .entries()
            .iter()
            .all(|(fqn, _)| fqn.last() != Some("__uuid")));
    }

    #[test]
    fn test_fqn_helpers() {
        let fqn = Fqn::parse("pipeline.stages.build");
        assert_eq!(fqn, Fqn::for_stage("build"));
        assert_eq!(fqn.to_string(), "pipeline.stages.build");
        assert_eq!(fqn.last(), Some("build"));
        assert!(Fqn::parse("pipeline.stages").is_prefix_of(&fqn));
        assert!(!fqn.is_prefix_of(&Fqn::parse("pipeline.stages")));
    }
}
