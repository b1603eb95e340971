//! Label store capability
//!
//! The label platform is consumed through [`LabelStore`]. Implementations
//! live in adapter crates; the engine only reads snapshots and submits
//! deltas.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::directory::DirectoryObject;

/// Label key to label value for one asset
pub type LabelSet = BTreeMap<String, String>;

/// Errors reported by a label store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelStoreError {
    /// The directory object has no managed asset on the platform
    #[error("No managed asset for {0}")]
    AssetNotFound(String),

    /// The platform refused or failed the request; may succeed on retry
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The platform session is no longer valid
    #[error("Authentication expired: {0}")]
    AuthExpired(String),
}

impl LabelStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Read and write access to asset labels on the platform
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// Current labels of the asset behind `object`
    async fn get_labels(&self, object: &DirectoryObject) -> Result<LabelSet, LabelStoreError>;

    /// Set each key in `delta` to its value; keys not in `delta` are left alone
    async fn set_labels(
        &self,
        object: &DirectoryObject,
        delta: &LabelSet,
    ) -> Result<(), LabelStoreError>;
}

#[async_trait]
impl<S: LabelStore + ?Sized> LabelStore for std::sync::Arc<S> {
    async fn get_labels(&self, object: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
        (**self).get_labels(object).await
    }

    async fn set_labels(
        &self,
        object: &DirectoryObject,
        delta: &LabelSet,
    ) -> Result<(), LabelStoreError> {
        (**self).set_labels(object, delta).await
    }
}

/// Entries of `desired` whose value is absent or different in `current`
pub fn compute_delta(desired: &LabelSet, current: &LabelSet) -> LabelSet {
    desired
        .iter()
        .filter(|(key, value)| current.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
