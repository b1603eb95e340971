//! [`LabelStore`] backed by the platform API

use std::collections::HashMap;

use async_trait::async_trait;
use labeler_core::{DirectoryObject, LabelSet, LabelStore, LabelStoreError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::client::CentraClient;
use crate::types::AssetLabel;

/// Label store that maps directory objects to platform assets by agent name
///
/// Asset ids found by `get_labels` are cached per object so the write that
/// follows does not repeat the agent lookup.
pub struct CentraLabelStore {
    client: CentraClient,
    assets: RwLock<HashMap<String, String>>,
}

impl CentraLabelStore {
    pub fn new(client: CentraClient) -> Self {
        Self {
            client,
            assets: RwLock::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &CentraClient {
        &self.client
    }

    async fn asset_id(&self, object: &DirectoryObject) -> Result<String, LabelStoreError> {
        if let Some(id) = self.assets.read().await.get(&object.id) {
            return Ok(id.clone());
        }

        let agent = self
            .client
            .find_agent(&object.name)
            .await?
            .ok_or_else(|| LabelStoreError::AssetNotFound(format!("no agent named {}", object.name)))?;

        if agent.matches(&object.name) {
            debug!(asset = %object, asset_id = %agent.asset_id, "Matched agent");
        } else {
            warn!(
                asset = %object,
                asset_id = %agent.asset_id,
                agent = %agent.display_name,
                "No agent matches the name exactly, using the first lookup hit"
            );
        }
        self.assets
            .write()
            .await
            .insert(object.id.clone(), agent.asset_id.clone());
        Ok(agent.asset_id)
    }
}

/// Labels as a key-to-value map; with repeated keys the last value wins
pub fn label_set(labels: &[AssetLabel]) -> LabelSet {
    labels
        .iter()
        .map(|label| (label.key.clone(), label.value.clone()))
        .collect()
}

/// Labels to detach so that each key in `delta` keeps only its new value
pub fn stale_labels<'a>(current: &'a [AssetLabel], delta: &LabelSet) -> Vec<&'a AssetLabel> {
    current
        .iter()
        .filter(|label| {
            delta
                .get(&label.key)
                .is_some_and(|wanted| *wanted != label.value)
        })
        .collect()
}

#[async_trait]
impl LabelStore for CentraLabelStore {
    async fn get_labels(&self, object: &DirectoryObject) -> Result<LabelSet, LabelStoreError> {
        let asset_id = self.asset_id(object).await?;
        let labels = self.client.asset_labels(&asset_id).await?;
        Ok(label_set(&labels))
    }

    async fn set_labels(
        &self,
        object: &DirectoryObject,
        delta: &LabelSet,
    ) -> Result<(), LabelStoreError> {
        let asset_id = self.asset_id(object).await?;
        let current = self.client.asset_labels(&asset_id).await?;
        let vms = [asset_id];

        for label in stale_labels(&current, delta) {
            debug!(asset = %object, key = %label.key, value = %label.value, "Removing stale label");
            self.client
                .remove_from_label(&label.key, &label.value, &vms)
                .await?;
        }

        for (key, value) in delta {
            if current.iter().any(|l| l.key == *key && l.value == *value) {
                continue;
            }
            self.client.add_to_label(key, value, &vms).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn label(key: &str, value: &str) -> AssetLabel {
        AssetLabel {
            key: key.into(),
            value: value.into(),
        }
    }

    #[test]
    fn test_stale_labels_only_touch_delta_keys() {
        let current = vec![label("Tier", "Gold"), label("Tier", "Bronze"), label("Owner", "ops")];
        let delta = LabelSet::from([("Tier".to_string(), "Silver".to_string())]);

        let stale: Vec<_> = stale_labels(&current, &delta)
            .into_iter()
            .map(|l| l.value.as_str())
            .collect();
        assert_eq!(stale, vec!["Gold", "Bronze"]);
    }

    #[test]
    fn test_label_set_from_asset_labels() {
        let set = label_set(&[label("AD Admin", "Yes"), label("Env", "Prod")]);
        assert_eq!(set.get("AD Admin").map(String::as_str), Some("Yes"));
        assert_eq!(set.len(), 2);
    }
}
