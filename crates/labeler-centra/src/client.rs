//! REST client for the label platform

use std::fmt;
use std::time::Duration;

use labeler_core::PlatformSection;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{
    Agent, Asset, AssetLabel, AuthRequest, AuthResponse, LabelMembership, Page, select_agent,
};
use crate::{Error, Result};

/// Connection settings for [`CentraClient`]
#[derive(Clone)]
pub struct CentraConfig {
    /// Host name or full URL of the management server
    pub management_url: String,
    pub username: String,
    pub password: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for CentraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CentraConfig")
            .field("management_url", &self.management_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl CentraConfig {
    pub fn new(
        management_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            management_url: management_url.into(),
            username: username.into(),
            password: password.into(),
            timeout_secs: 30,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Build from the manifest's platform section
    ///
    /// # Errors
    ///
    /// Returns `MissingSetting` for the first absent field.
    pub fn from_section(section: &PlatformSection) -> Result<Self> {
        let require = |value: &Option<String>, name: &'static str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or(Error::MissingSetting { name })
        };

        Ok(Self::new(
            require(&section.management_url, "management_url")?,
            require(&section.username, "username")?,
            require(&section.password, "password")?,
        )
        .with_timeout(section.timeout_secs))
    }

    /// API root; a bare host name is reached over HTTPS
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.management_url.trim().trim_end_matches('/');
        let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let url = Url::parse(&with_scheme).map_err(|e| Error::InvalidUrl {
            url: self.management_url.clone(),
            message: e.to_string(),
        })?;
        if url.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                url: self.management_url.clone(),
                message: "not a base URL".into(),
            });
        }
        Ok(url)
    }
}

fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

/// Authenticated session against the platform API
pub struct CentraClient {
    config: CentraConfig,
    base: Url,
    http: Client,
    token: RwLock<Option<String>>,
}

impl CentraClient {
    const API_PREFIX: [&'static str; 2] = ["api", "v3.0"];

    pub fn new(config: CentraConfig) -> Result<Self> {
        let base = config.base_url()?;
        let http = build_http_client(config.timeout_secs)?;

        Ok(Self {
            config,
            base,
            http,
            token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &CentraConfig {
        &self.config
    }

    /// URL of an API endpoint; each segment is percent-encoded on its own
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `base_url` rejects URLs that cannot be a base, so this always applies
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(Self::API_PREFIX)
                .extend(segments);
        }
        url
    }

    /// Log in and keep the bearer token for later calls
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` on HTTP 401, `MfaRequired` if the account needs a
    /// second factor.
    pub async fn authenticate(&self) -> Result<()> {
        info!(url = %self.base, user = %self.config.username, "Authenticating to label platform");

        let response = self
            .http
            .post(self.endpoint(&["authenticate"]))
            .json(&AuthRequest {
                username: &self.config.username,
                password: &self.config.password,
            })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Err(Error::InvalidCredentials);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        let auth: AuthResponse = serde_json::from_str(&body)?;
        if auth.two_factor_token.is_some() {
            return Err(Error::MfaRequired);
        }
        let token = auth.access_token.ok_or_else(|| Error::Status {
            status: status.as_u16(),
            body: "response carries no access_token".into(),
        })?;

        *self.token.write().await = Some(token);
        debug!("Authenticated");
        Ok(())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Agent reporting for the computer called `name`, if any
    pub async fn find_agent(&self, name: &str) -> Result<Option<Agent>> {
        let request = self
            .http
            .get(self.endpoint(&["agents"]))
            .query(&[("gc_filter", name), ("limit", "20")]);
        let page: Page<Agent> = self.send_json(request).await?;

        debug!(name = %name, hits = page.objects.len(), "Agent lookup");
        Ok(select_agent(page.objects, name))
    }

    /// Labels currently attached to an asset
    pub async fn asset_labels(&self, asset_id: &str) -> Result<Vec<AssetLabel>> {
        let request = self.http.get(self.endpoint(&["assets", asset_id]));
        let asset: Asset = self.send_json(request).await?;
        Ok(asset.labels)
    }

    /// Attach assets to the label `key: value`, creating it if needed
    pub async fn add_to_label(&self, key: &str, value: &str, asset_ids: &[String]) -> Result<()> {
        self.post_membership(key, value, asset_ids, false).await
    }

    /// Detach assets from the label `key: value`
    pub async fn remove_from_label(
        &self,
        key: &str,
        value: &str,
        asset_ids: &[String],
    ) -> Result<()> {
        self.post_membership(key, value, asset_ids, true).await
    }

    async fn post_membership(
        &self,
        key: &str,
        value: &str,
        asset_ids: &[String],
        delete: bool,
    ) -> Result<()> {
        let request = self
            .http
            .post(self.endpoint(&["assets", "labels", key, value]))
            .json(&LabelMembership {
                vms: asset_ids,
                delete,
            });
        self.send(request).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let token = self
            .token
            .read()
            .await
            .clone()
            .ok_or(Error::NotAuthenticated)?;

        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send(request).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn client(url: &str) -> CentraClient {
        CentraClient::new(CentraConfig::new(url, "svc", "pw")).unwrap()
    }

    #[rstest]
    #[case("cc.example.com", "https://cc.example.com/api/v3.0/agents")]
    #[case("cc.example.com/", "https://cc.example.com/api/v3.0/agents")]
    #[case("http://127.0.0.1:8080", "http://127.0.0.1:8080/api/v3.0/agents")]
    fn test_endpoint_base(#[case] management_url: &str, #[case] expected: &str) {
        assert_eq!(client(management_url).endpoint(&["agents"]).as_str(), expected);
    }

    #[test]
    fn test_label_segments_are_encoded() {
        let url = client("cc.example.com").endpoint(&["assets", "labels", "AD Admin", "a/b"]);
        assert_eq!(
            url.as_str(),
            "https://cc.example.com/api/v3.0/assets/labels/AD%20Admin/a%2Fb"
        );
    }

    #[test]
    fn test_config_from_section_requires_credentials() {
        let section = PlatformSection {
            management_url: Some("cc.example.com".into()),
            username: Some("svc".into()),
            password: None,
            timeout_secs: 10,
        };

        let err = CentraConfig::from_section(&section).unwrap_err();
        assert!(matches!(err, Error::MissingSetting { name: "password" }));
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let debug = format!("{:?}", CentraConfig::new("cc", "svc", "hunter2"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_calls_before_authenticate_fail() {
        let err = client("cc.example.com").find_agent("web1").await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
    }
}
