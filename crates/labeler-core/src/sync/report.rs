//! Sync run reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::directory::DirectoryObject;
use crate::labels::LabelSet;

/// Final disposition of one object in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// A mutation was issued (or would be, in a dry run)
    Applied,
    /// The platform already holds every desired value
    SkippedIdentical,
    /// The object has no managed asset
    SkippedMissing,
    /// Reading or writing labels failed after retries
    Failed,
}

/// What happened to one directory object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectOutcome {
    pub object: DirectoryObject,
    pub kind: OutcomeKind,
    /// Labels written (applied outcomes only)
    #[serde(skip_serializing_if = "LabelSet::is_empty")]
    pub labels: LabelSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ObjectOutcome {
    pub fn applied(object: DirectoryObject, labels: LabelSet) -> Self {
        Self {
            object,
            kind: OutcomeKind::Applied,
            labels,
            detail: None,
        }
    }

    pub fn skipped_identical(object: DirectoryObject) -> Self {
        Self {
            object,
            kind: OutcomeKind::SkippedIdentical,
            labels: LabelSet::new(),
            detail: None,
        }
    }

    pub fn skipped_missing(object: DirectoryObject, detail: impl Into<String>) -> Self {
        Self {
            object,
            kind: OutcomeKind::SkippedMissing,
            labels: LabelSet::new(),
            detail: Some(detail.into()),
        }
    }

    pub fn failed(object: DirectoryObject, detail: impl Into<String>) -> Self {
        Self {
            object,
            kind: OutcomeKind::Failed,
            labels: LabelSet::new(),
            detail: Some(detail.into()),
        }
    }
}

/// Per-rule evaluation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub scope: String,
    /// Distinct objects the scope resolved to
    pub matched: usize,
    /// Matched objects whose current labels differ from this rule's labels
    pub contributing: usize,
    /// Matched objects without a managed asset
    pub missing_assets: usize,
    /// The scope itself does not exist in the directory
    pub scope_missing: bool,
}

impl RuleReport {
    pub fn new(rule: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            scope: scope.into(),
            ..Default::default()
        }
    }
}

/// Summary of one sync run
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    /// Correlates log lines of this run
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub applied: usize,
    pub skipped_identical: usize,
    pub skipped_missing: usize,
    pub failed: usize,
    pub rules: Vec<RuleReport>,
    /// Object outcomes sorted by object identifier
    pub outcomes: Vec<ObjectOutcome>,
}

impl SyncSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            applied: 0,
            skipped_identical: 0,
            skipped_missing: 0,
            failed: 0,
            rules: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Add a rule report; a missing scope counts as skipped-missing
    pub fn record_rule(&mut self, report: RuleReport) {
        if report.scope_missing {
            self.skipped_missing += 1;
        }
        self.rules.push(report);
    }

    pub fn record(&mut self, outcome: ObjectOutcome) {
        match outcome.kind {
            OutcomeKind::Applied => self.applied += 1,
            OutcomeKind::SkippedIdentical => self.skipped_identical += 1,
            OutcomeKind::SkippedMissing => self.skipped_missing += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self) {
        self.outcomes.sort_by(|a, b| a.object.id.cmp(&b.object.id));
        self.finished_at = Some(Utc::now());
    }

    /// True when no object failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn outcomes_of(&self, kind: OutcomeKind) -> impl Iterator<Item = &ObjectOutcome> {
        self.outcomes.iter().filter(move |o| o.kind == kind)
    }

    pub fn outcome_for(&self, name: &str) -> Option<&ObjectOutcome> {
        self.outcomes.iter().find(|o| o.object.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> DirectoryObject {
        DirectoryObject::new(format!("CN={},OU=Servers,DC=corp", name), name)
    }

    #[test]
    fn test_counts_follow_recorded_outcomes() {
        let mut summary = SyncSummary::new(false);
        summary.record(ObjectOutcome::applied(host("b"), LabelSet::new()));
        summary.record(ObjectOutcome::skipped_identical(host("a")));
        summary.record(ObjectOutcome::failed(host("c"), "503"));
        summary.record_rule(RuleReport {
            scope_missing: true,
            ..RuleReport::new("gone", "subtree OU=Gone,DC=corp")
        });
        summary.finish();

        assert_eq!(summary.applied, 1);
        assert_eq!(summary.skipped_identical, 1);
        assert_eq!(summary.skipped_missing, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert!(summary.finished_at.is_some());

        let order: Vec<_> = summary.outcomes.iter().map(|o| o.object.name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_outcome_serializes_snake_case() {
        let outcome = ObjectOutcome::skipped_missing(host("a"), "no agent");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["kind"], "skipped_missing");
        assert_eq!(json["detail"], "no agent");
        assert!(json.get("labels").is_none());
    }
}
