//! Execution summary read model and its projector.

mod ambiance;
mod model;
mod patch;
mod projector;

pub use ambiance::{groups, Ambiance, Level};
pub use model::{
    ExecutionErrorInfo, FailureInfo, PipelineExecutionSummary, SkipInfo, StageLayoutEntry,
};
pub use patch::{layout_path, SummaryPatch};
pub use projector::{project_node_event, ExecutionSummaryProjector, NodeExecutionEvent};
