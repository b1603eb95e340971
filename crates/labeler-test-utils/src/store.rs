//! [`FakeLabelStore`] standing in for the label platform in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use labeler_core::{DirectoryObject, LabelSet, LabelStore, LabelStoreError};

/// One recorded call against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get { asset: String },
    Set { asset: String, delta: LabelSet },
}

#[derive(Debug, Default)]
struct Inner {
    assets: HashMap<String, LabelSet>,
    calls: Vec<StoreCall>,
    reject_sets: HashMap<String, u32>,
    reject_gets: HashMap<String, u32>,
    expire_sets: HashSet<String>,
}

/// In-memory label store keyed by asset name.
///
/// Only registered assets exist; anything else reports `AssetNotFound`.
/// Writes merge into the stored labels, so a second run sees the result of
/// the first.
#[derive(Debug, Default)]
pub struct FakeLabelStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl FakeLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset with its current labels
    pub fn with_asset(self, name: &str, labels: LabelSet) -> Self {
        self.inner
            .lock()
            .unwrap()
            .assets
            .insert(name.to_string(), labels);
        self
    }

    /// Reject the next `times` writes to `name` with a retryable error
    pub fn rejecting_sets(self, name: &str, times: u32) -> Self {
        self.inner
            .lock()
            .unwrap()
            .reject_sets
            .insert(name.to_string(), times);
        self
    }

    /// Reject the next `times` reads of `name` with a retryable error
    pub fn rejecting_gets(self, name: &str, times: u32) -> Self {
        self.inner
            .lock()
            .unwrap()
            .reject_gets
            .insert(name.to_string(), times);
        self
    }

    /// Report an expired session when writing to `name`
    pub fn expiring_on_set(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .expire_sets
            .insert(name.to_string());
        self
    }

    /// Delay every call, to exercise concurrency and timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Current labels of an asset
    pub fn labels_of(&self, name: &str) -> Option<LabelSet> {
        self.inner.lock().unwrap().assets.get(name).cloned()
    }

    /// All calls in the order they were made
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Write calls only
    pub fn set_calls(&self) -> Vec<(String, LabelSet)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Set { asset, delta } => Some((asset, delta)),
                StoreCall::Get { .. } => None,
            })
            .collect()
    }

    /// Number of write calls made for `name`
    pub fn set_count(&self, name: &str) -> usize {
        self.set_calls().iter().filter(|(asset, _)| asset == name).count()
    }

    /// Forget recorded calls, keeping asset state
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().calls.clear();
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn take_one(counter: &mut HashMap<String, u32>, name: &str) -> bool {
    match counter.get_mut(name) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl LabelStore for FakeLabelStore {
    async fn get_labels(&self, object: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(StoreCall::Get {
            asset: object.name.clone(),
        });

        if take_one(&mut inner.reject_gets, &object.name) {
            return Err(LabelStoreError::Rejected("503 Service Unavailable".into()));
        }

        inner
            .assets
            .get(&object.name)
            .cloned()
            .ok_or_else(|| LabelStoreError::AssetNotFound(object.name.clone()))
    }

    async fn set_labels(
        &self,
        object: &DirectoryObject,
        delta: &LabelSet,
    ) -> Result<(), LabelStoreError> {
        self.pause().await;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(StoreCall::Set {
            asset: object.name.clone(),
            delta: delta.clone(),
        });

        if inner.expire_sets.contains(&object.name) {
            return Err(LabelStoreError::AuthExpired("401 Unauthorized".into()));
        }
        if take_one(&mut inner.reject_sets, &object.name) {
            return Err(LabelStoreError::Rejected("429 Too Many Requests".into()));
        }

        let labels = inner
            .assets
            .get_mut(&object.name)
            .ok_or_else(|| LabelStoreError::AssetNotFound(object.name.clone()))?;
        labels.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
