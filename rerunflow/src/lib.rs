//! # Rerunflow
//!
//! Retry and resume planning for multi-stage pipeline executions.
//!
//! Given a prior execution that failed part-way, rerunflow decides whether it
//! can be retried, which stages run again and which stages reuse their prior
//! results, and produces a rewritten execution plan for the runtime:
//!
//! - **Compatibility**: a retry is allowed only while the stage identifiers of
//!   the pipeline are unchanged
//! - **Retry index**: the stage ledger grouped into sequential and parallel groups
//! - **Stage-skip planning**: the previous processed tree is spliced into the
//!   current one up to the first retried stage
//! - **Plan rewrite**: skipped stages become identity nodes pointing at their
//!   prior node executions
//! - **Lineage**: trigger lineage and retry chains link every retry to its root
//! - **Summary projection**: node status events become field-scoped patches of
//!   the execution summary
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rerunflow::prelude::*;
//!
//! let service = RetryExecutionService::new(collaborators);
//! let info = service.validate_retry("deploy", "exec-1").await?;
//! if info.is_resumable {
//!     let outcome = service
//!         .retry(&RetryRequest::new("deploy", "exec-1", vec!["test".into()]))
//!         .await?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod definition;
pub mod errors;
pub mod events;
pub mod lineage;
pub mod observability;
pub mod plan;
pub mod ports;
pub mod retry;
pub mod service;
pub mod summary;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ResumeConfig;
    pub use crate::core::{ExecutionStatus, StepCategory, StepType};
    pub use crate::definition::{Fqn, FqnIndex, PipelineDefinition, StageEntry};
    pub use crate::errors::{ErrorInfo, Result, RetryError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::lineage::{ExecutionTriggerInfo, RetryExecutionMetadata, TriggerType, TriggeredBy};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::plan::{transform_plan, Node, Plan, PlanTransformer};
    pub use crate::ports::{
        LedgerStore, PipelineStore, PlanCompiler, Runtime, StoreError, SummaryStore,
    };
    pub use crate::retry::{
        build_retry_index, is_retry_compatible, partition, resolve_retry_stages,
        select_failed_stages, RetryIndex,
    };
    pub use crate::service::{
        RetryCollaborators, RetryExecutionService, RetryInfo, RetryOutcome, RetryRequest,
    };
    pub use crate::summary::{ExecutionSummaryProjector, NodeExecutionEvent, PipelineExecutionSummary};
}
