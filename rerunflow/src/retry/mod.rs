//! Retry planning over a prior execution.
//!
//! - [`is_retry_compatible`] gates retry on the executed vs. current definition
//! - [`build_retry_index`] groups the stage ledger by structural successor
//! - [`select_failed_stages`] / [`resolve_retry_stages`] pick the stages to re-run
//! - [`partition`] splices the previous processed tree into the current one
//!
//! Every function here is pure and works on snapshots.

mod compatibility;
mod index;
mod partition;
mod selector;

pub use compatibility::{is_retry_compatible, INCOMPATIBLE_PIPELINE_MESSAGE};
pub use index::{
    build_retry_index, RetryGroup, RetryIndex, RetryStageInfo, NO_STAGE_DETAILS_MESSAGE,
};
pub use partition::{partition, partition_definitions, Partition};
pub use selector::{
    resolve_retry_stages, select_failed_stages, NO_FAILED_STAGE_MESSAGE,
    NO_STAGE_SELECTED_MESSAGE, ONLY_FAILED_OUTSIDE_GROUP_MESSAGE,
};
