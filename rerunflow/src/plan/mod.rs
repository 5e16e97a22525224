//! Compiled plans and their retry rewrite.

mod graph;
mod node;
mod transformer;

pub use graph::Plan;
pub use node::{AdviserObtainment, IdentityPlanNode, Node, NodeId, PlanNode};
pub use transformer::{transform_plan, PlanTransformer, PriorNodeExecution, SkipResolution};
