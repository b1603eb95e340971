//! Request and response bodies of the platform API

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct AuthRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Present when the account requires a second factor
    #[serde(default, rename = "2fa_temp_token")]
    pub two_factor_token: Option<String>,
}

/// One page of a list endpoint
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub objects: Vec<T>,
    #[serde(default)]
    pub total_count: u64,
}

/// An installed agent and the asset it reports for
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Agent {
    pub asset_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub hostname: String,
}

impl Agent {
    /// Whether this agent reports for the computer called `name`
    ///
    /// Compares case-insensitively against the display name, the hostname and
    /// the first label of a fully qualified hostname.
    pub fn matches(&self, name: &str) -> bool {
        let short_host = self.hostname.split('.').next().unwrap_or_default();
        [self.display_name.as_str(), self.hostname.as_str(), short_host]
            .iter()
            .any(|candidate| !candidate.is_empty() && candidate.eq_ignore_ascii_case(name))
    }
}

/// Pick the agent for `name`: an exact match if there is one, else the first hit
pub fn select_agent(agents: Vec<Agent>, name: &str) -> Option<Agent> {
    match agents.iter().position(|agent| agent.matches(name)) {
        Some(index) => agents.into_iter().nth(index),
        None => agents.into_iter().next(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetLabel {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Asset {
    #[serde(default)]
    pub labels: Vec<AssetLabel>,
}

/// Body of `POST /assets/labels/<key>/<value>`
#[derive(Debug, Serialize)]
pub(crate) struct LabelMembership<'a> {
    pub vms: &'a [String],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn agent(asset_id: &str, display_name: &str, hostname: &str) -> Agent {
        Agent {
            asset_id: asset_id.into(),
            display_name: display_name.into(),
            hostname: hostname.into(),
        }
    }

    #[test]
    fn test_mfa_token_is_recognized() {
        let body: AuthResponse =
            serde_json::from_value(json!({"2fa_temp_token": "t", "extra": 1})).unwrap();
        assert!(body.two_factor_token.is_some());
        assert!(body.access_token.is_none());
    }

    #[test]
    fn test_agent_page_parses_with_unknown_fields() {
        let page: Page<Agent> = serde_json::from_value(json!({
            "objects": [{"asset_id": "a-1", "display_name": "WEB1", "status": "on"}],
            "total_count": 1,
            "current_page": 1
        }))
        .unwrap();

        assert_eq!(page.objects, vec![agent("a-1", "WEB1", "")]);
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_select_agent_prefers_exact_match() {
        let agents = vec![
            agent("a-1", "web10", "web10.corp.local"),
            agent("a-2", "other", "WEB1.corp.local"),
        ];

        assert_eq!(select_agent(agents, "web1").unwrap().asset_id, "a-2");
    }

    #[test]
    fn test_select_agent_falls_back_to_first_hit() {
        let agents = vec![agent("a-1", "web10", ""), agent("a-2", "web11", "")];
        assert_eq!(select_agent(agents, "web1").unwrap().asset_id, "a-1");
        assert!(select_agent(Vec::new(), "web1").is_none());
    }

    #[test]
    fn test_membership_body() {
        let vms = vec!["a-1".to_string()];
        let add = serde_json::to_value(LabelMembership { vms: &vms, delete: false }).unwrap();
        let remove = serde_json::to_value(LabelMembership { vms: &vms, delete: true }).unwrap();

        assert_eq!(add, json!({"vms": ["a-1"]}));
        assert_eq!(remove, json!({"vms": ["a-1"], "delete": true}));
    }
}
