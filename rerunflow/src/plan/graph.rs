//! The compiled plan as an arena of nodes.

use serde::{Deserialize, Serialize};

use super::node::{Node, NodeId};

/// A compiled execution plan.
///
/// Nodes live in an arena addressed by [`NodeId`]; parent/child links are
/// ids, so swapping a node's payload never touches other nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Plan uuid.
    pub uuid: String,
    /// Entry node of the plan.
    pub starting_node_id: Option<NodeId>,
    /// Layout of the graph for display.
    #[serde(default)]
    pub graph_layout: Option<serde_json::Value>,
    /// Whether the plan compiled without errors.
    #[serde(default = "default_valid")]
    pub valid: bool,
    nodes: Vec<Node>,
}

fn default_valid() -> bool {
    true
}

impl Plan {
    /// Creates an empty, valid plan.
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            valid: true,
            ..Self::default()
        }
    }

    /// Sets the starting node.
    #[must_use]
    pub fn with_starting_node(mut self, id: NodeId) -> Self {
        self.starting_node_id = Some(id);
        self
    }

    /// Sets the graph layout.
    #[must_use]
    pub fn with_graph_layout(mut self, layout: serde_json::Value) -> Self {
        self.graph_layout = Some(layout);
        self
    }

    /// Appends a node and returns its id.
    pub fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Returns every node, in arena order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns the node with `id`.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Returns the id of the node with `uuid`.
    #[must_use]
    pub fn node_id(&self, uuid: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.uuid() == uuid).map(NodeId)
    }

    /// Returns the node with `uuid`.
    #[must_use]
    pub fn node_by_uuid(&self, uuid: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.uuid() == uuid)
    }

    /// Returns true if some node belongs to the stage with `stage_fqn`.
    #[must_use]
    pub fn has_stage_fqn(&self, stage_fqn: &str) -> bool {
        self.nodes.iter().any(|n| n.stage_fqn() == stage_fqn)
    }

    /// Replaces the payload of node `id`, returning the previous payload.
    ///
    /// Returns `None` and leaves the plan untouched if `id` is out of range.
    pub fn replace_node(&mut self, id: NodeId, node: Node) -> Option<Node> {
        self.nodes
            .get_mut(id.0)
            .map(|slot| std::mem::replace(slot, node))
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the plan has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of identity nodes.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_identity()).count()
    }
}
