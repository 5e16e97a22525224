//! In-memory collaborators and fixtures for tests and demos.
//!
//! This module provides:
//! - In-memory pipeline, ledger and summary stores
//! - A plan compiler that derives plans from processed YAML
//! - A runtime that records started executions
//! - Fixtures seeding finished executions

mod fakes;
mod fixtures;
mod stores;

pub use fakes::{strategy_uuid, RecordingRuntime, StartedExecution, YamlPlanCompiler, STAGE_STEP_TYPE};
pub use fixtures::{pipeline_yaml, stage_ledger, RetryFixture};
pub use stores::{InMemoryLedgerStore, InMemoryPipelineStore, InMemorySummaryStore};
