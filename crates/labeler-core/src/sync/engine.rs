//! Reconciliation engine
//!
//! Evaluating a rule resolves its scope, reads the current labels of every
//! object not seen earlier in the run, and merges the rule's labels into
//! that object's desired state. Nothing is written until [`ReconciliationEngine::apply`],
//! which issues at most one mutation per object carrying the fully merged
//! delta.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use futures::{StreamExt, stream};
use tracing::{debug, error, info, warn};

use super::SyncOptions;
use super::report::{ObjectOutcome, RuleReport};
use crate::directory::{DirectoryError, DirectoryObject, MembershipProvider};
use crate::labels::{LabelSet, LabelStore, LabelStoreError, compute_delta};
use crate::rules::Rule;
use crate::{Error, Result};

/// Desired state of one object, accumulated across rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectPlan {
    pub object: DirectoryObject,
    /// Labels the platform held when the object was first matched
    pub current: LabelSet,
    /// Merged labels of every matching rule, later rules winning per key
    pub desired: LabelSet,
    /// Names of the matching rules, in evaluation order
    pub rules: Vec<String>,
}

impl ObjectPlan {
    pub fn new(object: DirectoryObject, current: LabelSet) -> Self {
        Self {
            object,
            current,
            desired: LabelSet::new(),
            rules: Vec::new(),
        }
    }

    /// Merge a rule's labels; keys it sets replace earlier values
    pub fn merge(&mut self, rule: &Rule) {
        self.desired
            .extend(rule.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.rules.push(rule.name.clone());
    }

    /// Labels that still have to be written
    pub fn delta(&self) -> LabelSet {
        compute_delta(&self.desired, &self.current)
    }
}

/// Per-object state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectState {
    Planned(ObjectPlan),
    Missing { object: DirectoryObject, reason: String },
    Failed { object: DirectoryObject, reason: String },
}

/// Everything accumulated for one run, keyed by object identifier
///
/// Each object appears once, so the apply phase never has two workers on
/// the same object.
#[derive(Debug, Default)]
pub struct RunState {
    objects: BTreeMap<String, ObjectState>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ObjectState> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn insert(&mut self, state: ObjectState) {
        let id = match &state {
            ObjectState::Planned(plan) => plan.object.id.clone(),
            ObjectState::Missing { object, .. } | ObjectState::Failed { object, .. } => {
                object.id.clone()
            }
        };
        self.objects.insert(id, state);
    }
}

/// Evaluates rules against the directory and the label store
pub struct ReconciliationEngine<'a, D, S> {
    directory: &'a D,
    store: &'a S,
    options: &'a SyncOptions,
}

impl<'a, D, S> ReconciliationEngine<'a, D, S>
where
    D: MembershipProvider,
    S: LabelStore,
{
    pub fn new(directory: &'a D, store: &'a S, options: &'a SyncOptions) -> Self {
        Self {
            directory,
            store,
            options,
        }
    }

    /// Evaluate one rule and merge its labels into `state`
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the scope cannot be resolved and
    /// `AuthExpired` if the label store session ended. A missing scope or
    /// missing asset is recorded, not returned.
    pub async fn evaluate_rule(&self, rule: &Rule, state: &mut RunState) -> Result<RuleReport> {
        info!(rule = %rule.name, scope = %rule.scope, "Evaluating rule");
        let mut report = RuleReport::new(&rule.name, rule.scope.to_string());

        let members = match self.resolve_members(rule).await? {
            Some(members) => members,
            None => {
                report.scope_missing = true;
                return Ok(report);
            }
        };
        report.matched = members.len();

        self.load_current_labels(&members, state).await?;

        for object in &members {
            match state.objects.get_mut(&object.id) {
                Some(ObjectState::Planned(plan)) => {
                    if compute_delta(&rule.labels, &plan.current).is_empty() {
                        debug!(rule = %rule.name, asset = %object, "Labels already present");
                    } else {
                        report.contributing += 1;
                    }
                    plan.merge(rule);
                }
                Some(ObjectState::Missing { .. }) => report.missing_assets += 1,
                Some(ObjectState::Failed { .. }) | None => {}
            }
        }

        info!(
            rule = %rule.name,
            matched = report.matched,
            contributing = report.contributing,
            "Rule evaluated"
        );
        Ok(report)
    }

    /// Write the merged delta of every planned object
    ///
    /// # Errors
    ///
    /// Returns `AuthExpired` if the label store session ended; objects
    /// written before that keep their new labels.
    pub async fn apply(&self, state: RunState) -> Result<Vec<ObjectOutcome>> {
        let mut outcomes = Vec::with_capacity(state.len());
        let mut pending = Vec::new();

        for (_, object_state) in state.objects {
            match object_state {
                ObjectState::Missing { object, reason } => {
                    outcomes.push(ObjectOutcome::skipped_missing(object, reason));
                }
                ObjectState::Failed { object, reason } => {
                    outcomes.push(ObjectOutcome::failed(object, reason));
                }
                ObjectState::Planned(plan) => {
                    let delta = plan.delta();
                    if delta.is_empty() {
                        debug!(asset = %plan.object, "No label changes needed");
                        outcomes.push(ObjectOutcome::skipped_identical(plan.object));
                    } else {
                        pending.push((plan.object, delta));
                    }
                }
            }
        }

        if self.options.dry_run {
            for (object, delta) in pending {
                info!(asset = %object, labels = ?delta, "[dry-run] Would set labels");
                outcomes.push(ObjectOutcome::applied(object, delta));
            }
            return Ok(outcomes);
        }

        let mut writes = stream::iter(pending)
            .map(|(object, delta)| async move {
                let result = self.store.set_labels(&object, &delta).await;
                (object, delta, result)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((object, delta, result)) = writes.next().await {
            match result {
                Ok(()) => {
                    info!(asset = %object, labels = ?delta, "Labels applied");
                    outcomes.push(ObjectOutcome::applied(object, delta));
                }
                Err(LabelStoreError::AuthExpired(message)) => {
                    return Err(Error::AuthExpired { message });
                }
                Err(LabelStoreError::AssetNotFound(message)) => {
                    warn!(asset = %object, "Asset disappeared before labeling");
                    outcomes.push(ObjectOutcome::skipped_missing(object, message));
                }
                Err(e) => {
                    error!(asset = %object, error = %e, "Failed to apply labels");
                    outcomes.push(ObjectOutcome::failed(object, e.to_string()));
                }
            }
        }

        Ok(outcomes)
    }

    /// Distinct members of the rule's scope, or `None` if the scope is missing
    async fn resolve_members(&self, rule: &Rule) -> Result<Option<Vec<DirectoryObject>>> {
        let mut results = self.directory.resolve(&rule.scope);
        let mut seen = HashSet::new();
        let mut members = Vec::new();

        loop {
            let next = match self.options.operation_timeout {
                Some(limit) => tokio::time::timeout(limit, results.next())
                    .await
                    .map_err(|_| resolve_timeout(rule, limit))?,
                None => results.next().await,
            };

            match next {
                None => break,
                Some(Ok(object)) => {
                    if seen.insert(object.id.clone()) {
                        members.push(object);
                    }
                }
                Some(Err(DirectoryError::ScopeNotFound(message))) => {
                    warn!(
                        rule = %rule.name,
                        scope = %rule.scope,
                        reason = %message,
                        "Scope not found, skipping rule"
                    );
                    return Ok(None);
                }
                Some(Err(DirectoryError::Unavailable(message))) => {
                    return Err(Error::DirectoryUnavailable { message });
                }
            }
        }

        Ok(Some(members))
    }

    /// Read labels for members not seen earlier in the run
    async fn load_current_labels(
        &self,
        members: &[DirectoryObject],
        state: &mut RunState,
    ) -> Result<()> {
        let unseen: Vec<&DirectoryObject> =
            members.iter().filter(|o| !state.contains(&o.id)).collect();

        let mut reads = stream::iter(unseen)
            .map(|object| async move { (object, self.store.get_labels(object).await) })
            .buffer_unordered(self.options.concurrency.max(1));

        while let Some((object, result)) = reads.next().await {
            let object_state = match result {
                Ok(current) => ObjectState::Planned(ObjectPlan::new(object.clone(), current)),
                Err(LabelStoreError::AssetNotFound(reason)) => {
                    warn!(asset = %object, "No managed asset, skipping");
                    ObjectState::Missing {
                        object: object.clone(),
                        reason,
                    }
                }
                Err(LabelStoreError::AuthExpired(message)) => {
                    return Err(Error::AuthExpired { message });
                }
                Err(e) => {
                    error!(asset = %object, error = %e, "Failed to read labels");
                    ObjectState::Failed {
                        object: object.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            state.insert(object_state);
        }

        Ok(())
    }
}

fn resolve_timeout(rule: &Rule, limit: Duration) -> Error {
    Error::DirectoryUnavailable {
        message: format!("resolving {} timed out after {:?}", rule.scope, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Scope;
    use pretty_assertions::assert_eq;

    fn rule(name: &str, pairs: &[(&str, &str)]) -> Rule {
        Rule::new(
            name,
            Scope::subtree("OU=Servers,DC=corp", None).unwrap(),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> LabelSet {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_later_rule_wins_on_key_collision() {
        let object = DirectoryObject::new("CN=web1,OU=Servers,DC=corp", "web1");
        let mut plan = ObjectPlan::new(object, LabelSet::new());

        plan.merge(&rule("gold", &[("Tier", "Gold"), ("Env", "Prod")]));
        plan.merge(&rule("silver", &[("Tier", "Silver")]));

        assert_eq!(plan.desired, labels(&[("Env", "Prod"), ("Tier", "Silver")]));
        assert_eq!(plan.rules, vec!["gold", "silver"]);
    }

    #[test]
    fn test_precedence_applies_to_desired_state_not_rule_deltas() {
        // The platform already holds the winning value, so nothing is written
        let object = DirectoryObject::new("CN=web1,OU=Servers,DC=corp", "web1");
        let mut plan = ObjectPlan::new(object, labels(&[("Tier", "Silver")]));

        plan.merge(&rule("gold", &[("Tier", "Gold")]));
        plan.merge(&rule("silver", &[("Tier", "Silver")]));

        assert!(plan.delta().is_empty());
    }

    #[test]
    fn test_delta_leaves_unmentioned_keys_alone() {
        let object = DirectoryObject::new("CN=web1,OU=Servers,DC=corp", "web1");
        let mut plan = ObjectPlan::new(object, labels(&[("Owner", "ops"), ("Tier", "Gold")]));

        plan.merge(&rule("tier", &[("Tier", "Silver")]));

        assert_eq!(plan.delta(), labels(&[("Tier", "Silver")]));
    }
}
