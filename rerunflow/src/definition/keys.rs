//! Well-known keys of pipeline YAML trees.

/// Key of the compiled-tree uuid.
pub const UUID: &str = "__uuid";
/// Root key of a pipeline document.
pub const PIPELINE: &str = "pipeline";
/// Key of the top-level stage list.
pub const STAGES: &str = "stages";
/// Wrapper key of a single stage.
pub const STAGE: &str = "stage";
/// Wrapper key of a parallel group.
pub const PARALLEL: &str = "parallel";
/// Wrapper key of a single step.
pub const STEP: &str = "step";
/// Wrapper key of a step group.
pub const STEP_GROUP: &str = "stepGroup";
/// Key of a node's user-authored identifier.
pub const IDENTIFIER: &str = "identifier";
/// Key of a node's display name.
pub const NAME: &str = "name";
