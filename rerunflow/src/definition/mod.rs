//! Pipeline definitions as ordered trees of stage entries.
//!
//! A definition is parsed from YAML into a list of [`StageEntry`] values,
//! each either a single stage or a parallel group of stages. The original
//! tree is retained so rewrites only replace the stage list.

mod entry;
mod fqn;
pub mod keys;

pub use entry::{is_valid_identifier, ParallelGroup, PipelineDefinition, StageEntry, StageNode};
pub use fqn::{Fqn, FqnIndex, FqnKind};
