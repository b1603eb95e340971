//! Directory membership capability
//!
//! The directory is consumed through [`MembershipProvider`], which turns a
//! rule scope into a lazy stream of member objects.

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::rules::Scope;

/// A computer object found in the directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DirectoryObject {
    /// Stable directory identifier (distinguished name)
    pub id: String,
    /// Name the label platform knows the asset by
    pub name: String,
}

impl DirectoryObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DirectoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Errors reported by a membership provider
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Connection, bind or query failure; ends the run
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    /// The scope's OU or group does not exist
    #[error("Scope not found: {0}")]
    ScopeNotFound(String),
}

/// Resolves rule scopes to directory members
pub trait MembershipProvider: Send + Sync {
    /// Stream the members of `scope`
    ///
    /// Each call starts a fresh query. Paging is the provider's concern. A
    /// missing scope is reported as a single `ScopeNotFound` item.
    fn resolve<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<DirectoryObject, DirectoryError>>;
}

impl<P: MembershipProvider + ?Sized> MembershipProvider for std::sync::Arc<P> {
    fn resolve<'a>(
        &'a self,
        scope: &'a Scope,
    ) -> BoxStream<'a, Result<DirectoryObject, DirectoryError>> {
        (**self).resolve(scope)
    }
}
