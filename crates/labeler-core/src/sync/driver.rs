//! Sync driver
//!
//! Runs every rule in declared order against one shared [`RunState`], then
//! applies the merged deltas and assembles the [`SyncSummary`].

use tracing::{Instrument, info, info_span};

use super::SyncOptions;
use super::engine::{ReconciliationEngine, RunState};
use super::report::SyncSummary;
use crate::{Error, Result};
use crate::directory::MembershipProvider;
use crate::labels::LabelStore;
use crate::retry::RetryingLabelStore;
use crate::rules::RuleSet;

/// Sequences a full labeling run
///
/// The driver owns both capability handles for the duration of the run.
/// Label store calls go through a [`RetryingLabelStore`] built from the
/// options.
pub struct SyncDriver<D, S> {
    directory: D,
    store: RetryingLabelStore<S>,
    options: SyncOptions,
}

impl<D, S> SyncDriver<D, S>
where
    D: MembershipProvider,
    S: LabelStore,
{
    pub fn new(directory: D, store: S, options: SyncOptions) -> Self {
        let store = RetryingLabelStore::new(store, options.retry)
            .with_attempt_timeout(options.operation_timeout);
        Self {
            directory,
            store,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn store(&self) -> &S {
        self.store.inner()
    }

    /// Release the capability handles
    pub fn into_parts(self) -> (D, S) {
        let Self {
            directory, store, ..
        } = self;
        (directory, store.into_inner())
    }

    /// Evaluate every rule and apply the resulting label changes
    ///
    /// # Errors
    ///
    /// Returns an error only for run-ending failures: an unreachable
    /// directory or an expired platform session. Per-object problems are
    /// counted in the summary.
    pub async fn run(&self, rules: &RuleSet) -> Result<SyncSummary> {
        let mut summary = SyncSummary::new(self.options.dry_run);
        let span = info_span!("sync", run_id = %summary.run_id, dry_run = self.options.dry_run);

        async move {
            info!(rules = rules.len(), "Starting label sync");

            let engine = ReconciliationEngine::new(&self.directory, &self.store, &self.options);
            let mut state = RunState::new();

            for rule in rules.rules() {
                let report = engine.evaluate_rule(rule, &mut state).await?;
                summary.record_rule(report);
            }

            for outcome in engine.apply(state).await? {
                summary.record(outcome);
            }
            summary.finish();

            info!(
                applied = summary.applied,
                skipped_identical = summary.skipped_identical,
                skipped_missing = summary.skipped_missing,
                failed = summary.failed,
                "Label sync finished"
            );
            Ok::<_, Error>(summary)
        }
        .instrument(span)
        .await
    }
}
