//! Stage entries and the pipeline definition built from them.

use serde_yaml::{Mapping, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::keys;
use crate::errors::{Result, RetryError};

fn identifier_regex() -> Option<&'static Regex> {
    static IDENTIFIER_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    IDENTIFIER_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_$]{0,127}$").ok())
        .as_ref()
}

/// Returns true if `identifier` is a syntactically valid stage identifier.
#[must_use]
pub fn is_valid_identifier(identifier: &str) -> bool {
    identifier_regex().is_some_and(|regex| regex.is_match(identifier))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// A single stage of a pipeline definition.
#[derive(Debug, Clone, PartialEq)]
pub struct StageNode {
    /// User-authored identifier, stable across edits.
    pub identifier: String,
    /// Display name, if any.
    pub name: Option<String>,
    /// Compiled-tree uuid, present in processed YAML only.
    pub uuid: Option<String>,
    /// The whole list item (`{stage: {...}}`).
    item: Value,
}

impl StageNode {
    /// Parses a stage from a `{stage: {...}}` list item.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidRequest`] if the item is not a stage or its
    /// identifier is missing or malformed.
    pub fn from_item(item: &Value) -> Result<Self> {
        let body = item
            .get(keys::STAGE)
            .filter(|body| body.is_mapping())
            .ok_or_else(|| RetryError::invalid_request("Expected a `stage` mapping"))?;

        let identifier = str_field(body, keys::IDENTIFIER).ok_or_else(|| {
            RetryError::invalid_request("Stage is missing an identifier")
                .with_fix_hint("Every stage needs an `identifier` field")
        })?;

        if !is_valid_identifier(identifier) {
            return Err(
                RetryError::invalid_request(format!("Invalid stage identifier: {identifier}"))
                    .with_context("identifier", identifier),
            );
        }

        Ok(Self {
            identifier: identifier.to_string(),
            name: str_field(body, keys::NAME).map(String::from),
            uuid: str_field(body, keys::UUID).map(String::from),
            item: item.clone(),
        })
    }

    /// Returns the list item this stage was parsed from.
    #[must_use]
    pub fn item(&self) -> &Value {
        &self.item
    }

    /// Returns a copy of this stage carrying `uuid` as its compiled-tree uuid.
    #[must_use]
    pub fn with_uuid(&self, uuid: Option<&str>) -> Self {
        let mut item = self.item.clone();
        if let Some(body) = item.get_mut(keys::STAGE).and_then(Value::as_mapping_mut) {
            set_uuid(body, uuid);
        }
        Self {
            identifier: self.identifier.clone(),
            name: self.name.clone(),
            uuid: uuid.map(String::from),
            item,
        }
    }
}

/// A group of stages that run concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelGroup {
    /// Compiled-tree uuid of the group, present in processed YAML only.
    pub uuid: Option<String>,
    /// Member stages, in authored order.
    pub members: Vec<StageNode>,
    item: Value,
}

impl ParallelGroup {
    /// Returns the list item this group was parsed from.
    #[must_use]
    pub fn item(&self) -> &Value {
        &self.item
    }

    /// Returns a copy of this group with new members and uuid.
    #[must_use]
    pub fn rebuild(&self, members: Vec<StageNode>, uuid: Option<&str>) -> Self {
        let mut item = self.item.clone();
        if let Some(map) = item.as_mapping_mut() {
            let list = members.iter().map(|m| m.item().clone()).collect();
            map.insert(Value::from(keys::PARALLEL), Value::Sequence(list));
            set_uuid(map, uuid);
        }
        Self {
            uuid: uuid.map(String::from),
            members,
            item,
        }
    }
}

fn set_uuid(map: &mut Mapping, uuid: Option<&str>) {
    match uuid {
        Some(uuid) => {
            map.insert(Value::from(keys::UUID), Value::from(uuid));
        }
        None => {
            map.remove(keys::UUID);
        }
    }
}

/// One entry of the top-level stage list.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEntry {
    /// A single stage.
    Stage(StageNode),
    /// A parallel group of stages.
    Parallel(ParallelGroup),
}

impl StageEntry {
    /// Parses a top-level stage list item.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidRequest`] for items that are neither a
    /// stage nor a parallel group, and for nested parallel groups.
    pub fn from_item(item: &Value) -> Result<Self> {
        if item.get(keys::STAGE).is_some() {
            return StageNode::from_item(item).map(Self::Stage);
        }

        let Some(members) = item.get(keys::PARALLEL).and_then(Value::as_sequence) else {
            return Err(RetryError::invalid_request(
                "Stage entry must contain either `stage` or `parallel`",
            ));
        };

        let members = members
            .iter()
            .map(|member| {
                if member.get(keys::PARALLEL).is_some() {
                    return Err(RetryError::invalid_request(
                        "Parallel groups cannot be nested",
                    ));
                }
                StageNode::from_item(member)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::Parallel(ParallelGroup {
            uuid: str_field(item, keys::UUID).map(String::from),
            members,
            item: item.clone(),
        }))
    }

    /// Returns the identifiers of the stages in this entry.
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            Self::Stage(stage) => vec![stage.identifier.as_str()],
            Self::Parallel(group) => group.members.iter().map(|m| m.identifier.as_str()).collect(),
        }
    }

    /// Returns the compiled-tree uuid of this entry.
    #[must_use]
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::Stage(stage) => stage.uuid.as_deref(),
            Self::Parallel(group) => group.uuid.as_deref(),
        }
    }

    /// Returns the list item of this entry.
    #[must_use]
    pub fn item(&self) -> &Value {
        match self {
            Self::Stage(stage) => stage.item(),
            Self::Parallel(group) => group.item(),
        }
    }

    /// Returns a short label of the entry kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stage(_) => keys::STAGE,
            Self::Parallel(_) => keys::PARALLEL,
        }
    }

    /// Returns true if both entries have the same kind and stage identifiers.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.identifiers() == other.identifiers()
    }
}

/// A parsed pipeline definition.
///
/// Keeps the original YAML tree so that everything outside the stage list
/// survives a rewrite untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    root: Value,
    entries: Vec<StageEntry>,
}

impl PipelineDefinition {
    /// Parses a pipeline definition from YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Yaml`] for malformed YAML and
    /// [`RetryError::InvalidRequest`] for structurally invalid definitions.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Err(RetryError::invalid_request("Empty pipeline definition"));
        }
        let root: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(root)
    }

    /// Builds a pipeline definition from a parsed YAML tree.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::InvalidRequest`] if `pipeline.stages` is missing,
    /// an entry is malformed, or a stage identifier is duplicated.
    pub fn from_value(root: Value) -> Result<Self> {
        let items = root
            .get(keys::PIPELINE)
            .and_then(|pipeline| pipeline.get(keys::STAGES))
            .and_then(Value::as_sequence)
            .ok_or_else(|| RetryError::invalid_request("Pipeline has no `pipeline.stages` list"))?;

        let entries = items
            .iter()
            .map(StageEntry::from_item)
            .collect::<Result<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for identifier in entries.iter().flat_map(StageEntry::identifiers) {
            if !seen.insert(identifier) {
                return Err(
                    RetryError::invalid_request(format!("Duplicate stage identifier: {identifier}"))
                        .with_context("identifier", identifier),
                );
            }
        }

        Ok(Self { root, entries })
    }

    /// Returns the top-level stage entries.
    #[must_use]
    pub fn entries(&self) -> &[StageEntry] {
        &self.entries
    }

    /// Returns the YAML tree.
    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Returns every stage identifier in execution order.
    #[must_use]
    pub fn stage_identifiers(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(StageEntry::identifiers)
            .map(String::from)
            .collect()
    }

    /// Returns true if a stage with `identifier` exists.
    #[must_use]
    pub fn contains_stage(&self, identifier: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.identifiers().contains(&identifier))
    }

    /// Returns a new definition with the stage list replaced by `entries`.
    #[must_use]
    pub fn with_entries(&self, entries: Vec<StageEntry>) -> Self {
        let mut root = self.root.clone();
        if let Some(pipeline) = root.get_mut(keys::PIPELINE).and_then(Value::as_mapping_mut) {
            let items = entries.iter().map(|entry| entry.item().clone()).collect();
            pipeline.insert(Value::from(keys::STAGES), Value::Sequence(items));
        }
        Self { root, entries }
    }

    /// Returns a new definition holding only the stages in `identifiers`.
    ///
    /// Parallel groups keep their matching members, in authored order, and
    /// are dropped when none match.
    #[must_use]
    pub fn retain_stages(&self, identifiers: &[String]) -> Self {
        let keep: HashSet<&str> = identifiers.iter().map(String::as_str).collect();
        let entries = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                StageEntry::Stage(stage) => keep
                    .contains(stage.identifier.as_str())
                    .then(|| entry.clone()),
                StageEntry::Parallel(group) => {
                    let members: Vec<StageNode> = group
                        .members
                        .iter()
                        .filter(|member| keep.contains(member.identifier.as_str()))
                        .cloned()
                        .collect();
                    if members.is_empty() {
                        None
                    } else if members.len() == group.members.len() {
                        Some(entry.clone())
                    } else {
                        Some(StageEntry::Parallel(
                            group.rebuild(members, group.uuid.as_deref()),
                        ))
                    }
                }
            })
            .collect();
        self.with_entries(entries)
    }

    /// Renders the definition as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Yaml`] if rendering fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROCESSED: &str = r"
pipeline:
  identifier: deploy
  stages:
    - stage:
        identifier: build
        name: Build
        __uuid: u-build
    - __uuid: u-par
      parallel:
        - stage:
            identifier: qa
            __uuid: u-qa
        - stage:
            identifier: perf
            __uuid: u-perf
";

    #[test]
    fn test_parse_entries() {
        let definition = PipelineDefinition::parse(PROCESSED).unwrap();

        assert_eq!(definition.entries().len(), 2);
        assert_eq!(definition.stage_identifiers(), vec!["build", "qa", "perf"]);
        assert_eq!(definition.entries()[0].uuid(), Some("u-build"));
        assert_eq!(definition.entries()[1].uuid(), Some("u-par"));
        assert!(definition.contains_stage("perf"));
        assert!(!definition.contains_stage("prod"));

        match &definition.entries()[0] {
            StageEntry::Stage(stage) => assert_eq!(stage.name.as_deref(), Some("Build")),
            StageEntry::Parallel(_) => panic!("expected a stage"),
        }
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let yaml = r"
pipeline:
  stages:
    - stage:
        identifier: a
    - parallel:
        - stage:
            identifier: a
";
        let err = PipelineDefinition::parse(yaml).unwrap_err();
        assert!(matches!(err, RetryError::InvalidRequest(_)));
        assert!(err.to_string().contains("Duplicate stage identifier: a"));
    }

    #[test]
    fn test_nested_parallel_rejected() {
        let yaml = r"
pipeline:
  stages:
    - parallel:
        - parallel:
            - stage:
                identifier: a
";
        let err = PipelineDefinition::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("cannot be nested"));
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let yaml = "pipeline:\n  stages:\n    - stage:\n        identifier: 1bad\n";
        let err = PipelineDefinition::parse(yaml).unwrap_err();
        assert!(matches!(err, RetryError::InvalidRequest(_)));
        assert!(is_valid_identifier("stage_1"));
        assert!(!is_valid_identifier("stage-1"));
    }

    #[test]
    fn test_missing_stages_and_bad_yaml() {
        assert!(matches!(
            PipelineDefinition::parse("pipeline:\n  identifier: x\n"),
            Err(RetryError::InvalidRequest(_))
        ));
        assert!(matches!(
            PipelineDefinition::parse("pipeline: [unclosed"),
            Err(RetryError::Yaml(_))
        ));
    }

    #[test]
    fn test_with_uuid_does_not_touch_original() {
        let definition = PipelineDefinition::parse(PROCESSED).unwrap();
        let StageEntry::Stage(build) = &definition.entries()[0] else {
            panic!("expected a stage");
        };

        let moved = build.with_uuid(Some("u-new"));
        assert_eq!(moved.uuid.as_deref(), Some("u-new"));
        assert_eq!(build.uuid.as_deref(), Some("u-build"));
        assert_eq!(
            moved.item().get("stage").and_then(|s| s.get("__uuid")),
            Some(&Value::from("u-new"))
        );
    }

    #[test]
    fn test_with_entries_round_trips_through_yaml() {
        let definition = PipelineDefinition::parse(PROCESSED).unwrap();
        let mut entries = definition.entries().to_vec();
        entries.reverse();

        let rewritten = definition.with_entries(entries);
        let reparsed = PipelineDefinition::parse(&rewritten.to_yaml().unwrap()).unwrap();

        assert_eq!(reparsed.stage_identifiers(), vec!["qa", "perf", "build"]);
        assert_eq!(
            reparsed.root().get("pipeline").and_then(|p| p.get("identifier")),
            Some(&Value::from("deploy"))
        );
    }

    #[test]
    fn test_retain_stages_narrows_entries_and_groups() {
        let definition = PipelineDefinition::parse(PROCESSED).unwrap();

        let narrowed = definition.retain_stages(&["perf".to_string()]);
        assert_eq!(narrowed.stage_identifiers(), vec!["perf"]);
        assert_eq!(narrowed.entries()[0].kind(), "parallel");
        assert_eq!(narrowed.entries()[0].uuid(), Some("u-par"));

        let reparsed = PipelineDefinition::parse(&narrowed.to_yaml().unwrap()).unwrap();
        assert_eq!(reparsed, narrowed);

        let untouched = definition.retain_stages(&definition.stage_identifiers());
        assert_eq!(untouched, definition);
        assert!(definition.retain_stages(&[]).entries().is_empty());
    }
}
