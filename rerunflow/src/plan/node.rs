//! Plan node types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::StepType;

/// Index of a node in a plan's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An adviser attached to a node, deciding where execution goes next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviserObtainment {
    /// Adviser type (e.g., "NEXT_STEP", "ON_FAIL").
    pub adviser_type: String,
    /// Serialized adviser parameters.
    #[serde(default)]
    pub parameters: String,
}

impl AdviserObtainment {
    /// Creates an adviser obtainment.
    #[must_use]
    pub fn new(adviser_type: impl Into<String>) -> Self {
        Self {
            adviser_type: adviser_type.into(),
            parameters: String::new(),
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: impl Into<String>) -> Self {
        self.parameters = parameters.into();
        self
    }
}

/// An executable node of a compiled plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNode {
    /// Node uuid, derived from the processed YAML.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// User-authored identifier.
    pub identifier: String,
    /// Step type.
    pub step_type: StepType,
    /// Execution group (e.g., "STAGE", "PIPELINE").
    #[serde(default)]
    pub group: Option<String>,
    /// FQN of the stage owning this node; empty for pipeline-level nodes.
    #[serde(default)]
    pub stage_fqn: String,
    /// Child nodes.
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Advisers routing execution after this node.
    #[serde(default)]
    pub adviser_obtainments: Vec<AdviserObtainment>,
}

impl PlanNode {
    /// Creates a plan node.
    #[must_use]
    pub fn new(uuid: impl Into<String>, identifier: impl Into<String>, step_type: StepType) -> Self {
        let identifier = identifier.into();
        Self {
            uuid: uuid.into(),
            name: identifier.clone(),
            identifier,
            step_type,
            group: None,
            stage_fqn: String::new(),
            children: Vec::new(),
            adviser_obtainments: Vec::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the execution group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Sets the owning stage FQN.
    #[must_use]
    pub fn with_stage_fqn(mut self, stage_fqn: impl Into<String>) -> Self {
        self.stage_fqn = stage_fqn.into();
        self
    }

    /// Sets the children.
    #[must_use]
    pub fn with_children(mut self, children: Vec<NodeId>) -> Self {
        self.children = children;
        self
    }

    /// Adds an adviser obtainment.
    #[must_use]
    pub fn with_adviser(mut self, adviser: AdviserObtainment) -> Self {
        self.adviser_obtainments.push(adviser);
        self
    }
}

/// A node that resolves to a prior node execution instead of executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityPlanNode {
    /// Node uuid, same as the node it replaces.
    pub uuid: String,
    /// Display name.
    pub name: String,
    /// User-authored identifier.
    pub identifier: String,
    /// Step type of the replaced node.
    pub original_step_type: StepType,
    /// Execution group.
    #[serde(default)]
    pub group: Option<String>,
    /// FQN of the owning stage.
    #[serde(default)]
    pub stage_fqn: String,
    /// Child nodes.
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Advisers of the replaced node.
    #[serde(default)]
    pub adviser_obtainments: Vec<AdviserObtainment>,
    /// The prior node execution whose result is reused.
    pub original_node_execution_id: String,
    /// Whether the runtime should follow `adviser_obtainments` after resolving.
    #[serde(default)]
    pub use_adviser_obtainments: bool,
}

impl IdentityPlanNode {
    /// Builds an identity node in place of `node`.
    #[must_use]
    pub fn from_plan_node(node: &PlanNode, original_node_execution_id: impl Into<String>) -> Self {
        Self {
            uuid: node.uuid.clone(),
            name: node.name.clone(),
            identifier: node.identifier.clone(),
            original_step_type: node.step_type.clone(),
            group: node.group.clone(),
            stage_fqn: node.stage_fqn.clone(),
            children: node.children.clone(),
            adviser_obtainments: node.adviser_obtainments.clone(),
            original_node_execution_id: original_node_execution_id.into(),
            use_adviser_obtainments: false,
        }
    }

    /// Sets whether advisers are followed.
    #[must_use]
    pub fn with_use_adviser_obtainments(mut self, use_adviser_obtainments: bool) -> Self {
        self.use_adviser_obtainments = use_adviser_obtainments;
        self
    }
}

/// A node of a plan arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Node {
    /// An executable node.
    Plan(PlanNode),
    /// A node resolving to a prior execution.
    Identity(IdentityPlanNode),
}

impl Node {
    /// Returns the node uuid.
    #[must_use]
    pub fn uuid(&self) -> &str {
        match self {
            Self::Plan(node) => &node.uuid,
            Self::Identity(node) => &node.uuid,
        }
    }

    /// Returns the node identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        match self {
            Self::Plan(node) => &node.identifier,
            Self::Identity(node) => &node.identifier,
        }
    }

    /// Returns the step type (the original one for identity nodes).
    #[must_use]
    pub fn step_type(&self) -> &StepType {
        match self {
            Self::Plan(node) => &node.step_type,
            Self::Identity(node) => &node.original_step_type,
        }
    }

    /// Returns the owning stage FQN.
    #[must_use]
    pub fn stage_fqn(&self) -> &str {
        match self {
            Self::Plan(node) => &node.stage_fqn,
            Self::Identity(node) => &node.stage_fqn,
        }
    }

    /// Returns the execution group.
    #[must_use]
    pub fn group(&self) -> Option<&str> {
        match self {
            Self::Plan(node) => node.group.as_deref(),
            Self::Identity(node) => node.group.as_deref(),
        }
    }

    /// Returns the child node ids.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match self {
            Self::Plan(node) => &node.children,
            Self::Identity(node) => &node.children,
        }
    }

    /// Returns true for identity nodes.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    /// Returns the executable node, if this is one.
    #[must_use]
    pub fn as_plan_node(&self) -> Option<&PlanNode> {
        match self {
            Self::Plan(node) => Some(node),
            Self::Identity(_) => None,
        }
    }

    /// Returns the identity node, if this is one.
    #[must_use]
    pub fn as_identity(&self) -> Option<&IdentityPlanNode> {
        match self {
            Self::Identity(node) => Some(node),
            Self::Plan(_) => None,
        }
    }
}
