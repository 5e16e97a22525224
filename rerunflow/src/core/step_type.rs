//! Step type descriptors shared by plans, ambiance levels and the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad category of a step type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepCategory {
    /// The pipeline root.
    Pipeline,
    /// The container of all stages.
    Stages,
    /// A single stage.
    Stage,
    /// A group of steps.
    StepGroup,
    /// A leaf step.
    Step,
    /// A matrix or looping strategy.
    Strategy,
    /// A parallel fork.
    Fork,
}

/// The type of a plan node's step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepType {
    /// The step type name (e.g., "BARRIER", "STRATEGY").
    #[serde(rename = "type")]
    pub type_name: String,
    /// The step category.
    pub category: StepCategory,
}

impl StepType {
    /// Type name of strategy (matrix/looping) nodes.
    pub const STRATEGY: &'static str = "STRATEGY";
    /// Type name of barrier steps.
    pub const BARRIER: &'static str = "BARRIER";

    /// Creates a new step type.
    #[must_use]
    pub fn new(type_name: impl Into<String>, category: StepCategory) -> Self {
        Self {
            type_name: type_name.into(),
            category,
        }
    }

    /// The strategy step type.
    #[must_use]
    pub fn strategy() -> Self {
        Self::new(Self::STRATEGY, StepCategory::Strategy)
    }

    /// The barrier step type.
    #[must_use]
    pub fn barrier() -> Self {
        Self::new(Self::BARRIER, StepCategory::Step)
    }

    /// Returns true for strategy nodes.
    #[must_use]
    pub fn is_strategy(&self) -> bool {
        self.category == StepCategory::Strategy && self.type_name == Self::STRATEGY
    }

    /// Returns true for barrier steps.
    #[must_use]
    pub fn is_barrier(&self) -> bool {
        self.type_name == Self::BARRIER
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_types() {
        assert!(StepType::strategy().is_strategy());
        assert!(StepType::barrier().is_barrier());
        assert!(!StepType::new("STRATEGY", StepCategory::Step).is_strategy());
    }

    #[test]
    fn test_serialize() {
        let json = serde_json::to_value(StepType::barrier()).unwrap();
        assert_eq!(json, serde_json::json!({"type": "BARRIER", "category": "STEP"}));
    }
}
