//! Label synchronization
//!
//! This module provides:
//! - **engine**: per-rule evaluation and the per-object apply phase
//! - **driver**: runs every rule in order and produces the run summary
//! - **report**: outcome types and the summary

mod driver;
mod engine;
mod report;

use std::time::Duration;

use crate::retry::RetryPolicy;

pub use driver::SyncDriver;
pub use engine::{ObjectPlan, ObjectState, ReconciliationEngine, RunState};
pub use report::{ObjectOutcome, OutcomeKind, RuleReport, SyncSummary};

/// Options for a sync run
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// If true, compute deltas but never write them.
    /// Objects that would change are reported as applied.
    pub dry_run: bool,
    /// Maximum objects read or written at once
    pub concurrency: usize,
    /// Retry policy for label store calls
    pub retry: RetryPolicy,
    /// Upper bound for one directory read or one label store attempt
    pub operation_timeout: Option<Duration>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: 4,
            retry: RetryPolicy::default(),
            operation_timeout: None,
        }
    }
}
