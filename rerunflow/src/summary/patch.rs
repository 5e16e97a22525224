//! Field-scoped patches against summary documents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An ordered list of field assignments addressed by dotted paths.
///
/// Path segments are split on `.`, so map keys used in paths (stage node
/// uuids) must not contain dots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryPatch {
    sets: Vec<(String, Value)>,
}

impl SummaryPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sets.push((path.into(), value.into()));
        self
    }

    /// Returns the assignments, in order.
    #[must_use]
    pub fn sets(&self) -> &[(String, Value)] {
        &self.sets
    }

    /// Returns the value assigned to `path`, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.sets
            .iter()
            .rev()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v)
    }

    /// Returns the number of assignments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns true if the patch assigns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Applies the patch to a JSON document.
    ///
    /// Missing or non-object intermediates are replaced by empty objects.
    pub fn apply(&self, document: &mut Value) {
        for (path, value) in &self.sets {
            let segments: Vec<&str> = path.split('.').collect();
            set_path(document, &segments, value.clone());
        }
    }
}

fn set_path(target: &mut Value, segments: &[&str], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(map) = target.as_object_mut() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*first).to_string(), value);
    } else {
        let child = map
            .entry((*first).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        set_path(child, rest, value);
    }
}

/// Path of a field of a stage layout entry.
#[must_use]
pub fn layout_path(node_uuid: &str, field: &str) -> String {
    format!("layoutNodeMap.{node_uuid}.{field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_apply_creates_intermediates() {
        let mut doc = json!({"status": "RUNNING", "layoutNodeMap": {}});
        SummaryPatch::new()
            .set(layout_path("u1", "status"), "FAILED")
            .set(layout_path("u1", "endTs"), 42)
            .set("status", "FAILED")
            .apply(&mut doc);

        assert_eq!(
            doc,
            json!({
                "status": "FAILED",
                "layoutNodeMap": {"u1": {"status": "FAILED", "endTs": 42}}
            })
        );
    }

    #[test]
    fn test_apply_leaves_sibling_fields() {
        let mut doc = json!({"layoutNodeMap": {"u1": {"status": "RUNNING", "barrierFound": false}}});
        SummaryPatch::new()
            .set(layout_path("u1", "barrierFound"), true)
            .apply(&mut doc);

        assert_eq!(doc["layoutNodeMap"]["u1"]["status"], "RUNNING");
        assert_eq!(doc["layoutNodeMap"]["u1"]["barrierFound"], true);
    }

    #[test]
    fn test_apply_replaces_scalar_intermediate() {
        let mut doc = json!({"executionErrorInfo": null});
        SummaryPatch::new()
            .set("executionErrorInfo.message", "boom")
            .apply(&mut doc);
        assert_eq!(doc["executionErrorInfo"]["message"], "boom");
    }

    #[test]
    fn test_apply_to_non_object_document() {
        let mut doc = Value::Null;
        SummaryPatch::new()
            .set(layout_path("u1", "status"), "SUCCESS")
            .apply(&mut doc);
        assert_eq!(doc, json!({"layoutNodeMap": {"u1": {"status": "SUCCESS"}}}));
    }

    #[test]
    fn test_get_returns_last_assignment() {
        let patch = SummaryPatch::new().set("status", "RUNNING").set("status", "SUCCESS");
        assert_eq!(patch.get("status"), Some(&json!("SUCCESS")));
        assert_eq!(patch.len(), 2);
        assert!(patch.get("endTs").is_none());
    }
}
