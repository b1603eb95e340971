//! [`FakeDirectory`] for membership resolution in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use labeler_core::{DirectoryError, DirectoryObject, MembershipProvider, Scope};

/// Scope-to-members table answering [`MembershipProvider::resolve`].
///
/// Unknown scopes resolve to `ScopeNotFound`. Every resolved scope is
/// recorded so tests can assert on query counts.
#[derive(Debug, Default)]
pub struct FakeDirectory {
    members: HashMap<Scope, Vec<DirectoryObject>>,
    failures: HashMap<Scope, DirectoryError>,
    hanging: HashSet<Scope>,
    resolved: Mutex<Vec<Scope>>,
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `scope` to `objects`, in the given order
    pub fn with_members(mut self, scope: Scope, objects: Vec<DirectoryObject>) -> Self {
        self.members.insert(scope, objects);
        self
    }

    /// Resolve `scope` to an empty result
    pub fn with_empty(self, scope: Scope) -> Self {
        self.with_members(scope, Vec::new())
    }

    /// Fail resolution of `scope` with `error`
    pub fn with_failure(mut self, scope: Scope, error: DirectoryError) -> Self {
        self.failures.insert(scope, error);
        self
    }

    /// Never yield anything for `scope`, as a server that stopped answering
    pub fn with_hang(mut self, scope: Scope) -> Self {
        self.hanging.insert(scope);
        self
    }

    /// Scopes resolved so far, in call order
    pub fn resolved(&self) -> Vec<Scope> {
        self.resolved.lock().unwrap().clone()
    }
}

impl MembershipProvider for FakeDirectory {
    fn resolve<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<DirectoryObject, DirectoryError>> {
        self.resolved.lock().unwrap().push(scope.clone());

        if let Some(error) = self.failures.get(scope) {
            return stream::once(futures::future::ready(Err(error.clone()))).boxed();
        }

        if self.hanging.contains(scope) {
            return stream::pending().boxed();
        }

        match self.members.get(scope) {
            Some(objects) => stream::iter(objects.iter().cloned().map(Ok)).boxed(),
            None => stream::once(futures::future::ready(Err(DirectoryError::ScopeNotFound(
                scope.to_string(),
            ))))
            .boxed(),
        }
    }
}
