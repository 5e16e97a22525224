//! Core domain model types shared by every component.
//!
//! - Execution status of pipeline, stage and step nodes
//! - Step type descriptors

mod status;
mod step_type;

pub use status::ExecutionStatus;
pub use step_type::{StepCategory, StepType};
