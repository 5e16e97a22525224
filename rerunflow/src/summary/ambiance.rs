//! Execution context stack of a node.

use serde::{Deserialize, Serialize};

use crate::core::StepType;

/// Well-known level groups.
pub mod groups {
    /// The pipeline node.
    pub const PIPELINE: &str = "PIPELINE";
    /// The container of all stages.
    pub const STAGES: &str = "STAGES";
    /// A stage node.
    pub const STAGE: &str = "STAGE";
    /// A step group node.
    pub const STEP_GROUP: &str = "STEP_GROUP";
    /// A step node.
    pub const STEP: &str = "STEP";
}

/// One frame of the execution context stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    /// Plan node uuid of the frame.
    pub setup_id: String,
    /// Node execution id of the frame.
    pub runtime_id: String,
    /// Identifier of the frame's node.
    pub identifier: String,
    /// Step type of the frame's node.
    pub step_type: StepType,
    /// Group of the frame (see [`groups`]).
    #[serde(default)]
    pub group: String,
}

impl Level {
    /// Creates a level.
    #[must_use]
    pub fn new(
        setup_id: impl Into<String>,
        runtime_id: impl Into<String>,
        identifier: impl Into<String>,
        step_type: StepType,
        group: impl Into<String>,
    ) -> Self {
        Self {
            setup_id: setup_id.into(),
            runtime_id: runtime_id.into(),
            identifier: identifier.into(),
            step_type,
            group: group.into(),
        }
    }
}

/// The execution context of a node: plan execution plus level stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ambiance {
    /// The plan execution id.
    pub plan_execution_id: String,
    /// Levels from the pipeline down to the node itself.
    #[serde(default)]
    pub levels: Vec<Level>,
}

impl Ambiance {
    /// Creates an empty ambiance for a plan execution.
    #[must_use]
    pub fn new(plan_execution_id: impl Into<String>) -> Self {
        Self {
            plan_execution_id: plan_execution_id.into(),
            levels: Vec::new(),
        }
    }

    /// Pushes a level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.levels.push(level);
        self
    }

    /// Returns the node's own level.
    #[must_use]
    pub fn current_level(&self) -> Option<&Level> {
        self.levels.last()
    }

    /// Returns the innermost stage level.
    #[must_use]
    pub fn stage_level(&self) -> Option<&Level> {
        self.levels.iter().rev().find(|l| l.group == groups::STAGE)
    }
}
