//! Manifest parsing for the labeler configuration file
//!
//! The manifest holds the platform connection settings, the directory
//! domains, sync tuning and the rules. The file may be YAML, TOML or JSON;
//! the format is picked from the extension.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::retry::RetryPolicy;
use crate::rules::{RuleSet, RulesConfig, Scope, dn_is_within};
use crate::sync::SyncOptions;
use crate::{Error, Result};

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> i32 {
    250
}

fn default_concurrency() -> usize {
    4
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    5000
}

fn default_operation_timeout_secs() -> u64 {
    60
}

/// Connection settings for the label platform
#[derive(Clone, Deserialize)]
pub struct PlatformSection {
    /// Management host, optionally with a scheme
    #[serde(default)]
    pub management_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PlatformSection {
    fn default() -> Self {
        Self {
            management_url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for PlatformSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSection")
            .field("management_url", &self.management_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Bind settings for one directory domain
#[derive(Clone, Deserialize)]
pub struct DomainConfig {
    /// `host`, `host:port` or an `ldap://`/`ldaps://` URL
    pub server: String,
    pub base_dn: String,
    pub bind_user: String,
    pub bind_password: String,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for DomainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainConfig")
            .field("server", &self.server)
            .field("base_dn", &self.base_dn)
            .field("bind_user", &self.bind_user)
            .field("bind_password", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Sync tuning
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// Maximum objects processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Upper bound for a single directory read or label call
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(Error::config(format!(
                "unsupported config format '{}' for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Parsed labeler configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Label platform settings
    #[serde(default, alias = "platform")]
    pub guardicore: PlatformSection,

    /// Directory domains keyed by the name rules refer to
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,

    #[serde(default)]
    pub sync: SyncSection,

    /// Rules in declared order
    #[serde(default)]
    pub rules: RulesConfig,
}

impl Manifest {
    /// Load a manifest from disk
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` if the file does not exist, and a config
    /// error if it cannot be parsed or references an unset variable.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse a manifest from text
    ///
    /// String values containing `${VAR}` are expanded from the environment
    /// before the typed sections are read.
    ///
    /// # Example
    ///
    /// ```
    /// use labeler_core::config::{ConfigFormat, Manifest};
    ///
    /// let manifest = Manifest::parse(r#"
    /// rules:
    ///   admins:
    ///     target_dn: OU=Admins,DC=corp,DC=local
    ///     labels:
    ///       AD Admin: "Yes"
    /// "#, ConfigFormat::Yaml).unwrap();
    ///
    /// assert_eq!(manifest.rules.0.len(), 1);
    /// ```
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let mut value: Value = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| Error::config(format!("YAML: {}", e)))?,
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| Error::config(format!("TOML: {}", e)))?
            }
            ConfigFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::config(format!("JSON: {}", e)))?,
        };

        if value.is_null() {
            value = Value::Object(Default::default());
        }
        expand_env(&mut value)?;

        serde_json::from_value(value).map_err(|e| Error::config(e.to_string()))
    }

    /// Apply command-line overrides for the platform section
    pub fn with_platform_overrides(
        mut self,
        management_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        if management_url.is_some() {
            self.guardicore.management_url = management_url;
        }
        if username.is_some() {
            self.guardicore.username = username;
        }
        if password.is_some() {
            self.guardicore.password = password;
        }
        self
    }

    /// Build the rule set and check every rule routes to a configured domain
    ///
    /// # Errors
    ///
    /// Returns the first rule or routing problem found.
    pub fn rule_set(&self) -> Result<RuleSet> {
        let rules = RuleSet::load(&self.rules)?;

        for rule in rules.rules() {
            if route_scope(&self.domains, &rule.scope).is_none() {
                let message = match rule.scope.domain() {
                    Some(domain) => format!("unknown domain '{}'", domain),
                    None => "no configured domain contains target_dn".to_string(),
                };
                return Err(Error::invalid_rule(&rule.name, message));
            }
        }

        Ok(rules)
    }

    /// Check the manifest without building anything from it
    ///
    /// # Errors
    ///
    /// Returns the first rule or routing problem found.
    pub fn validate(&self) -> Result<()> {
        self.rule_set().map(|_| ())
    }

    /// Name of the domain that should answer queries for `scope`
    pub fn domain_for(&self, scope: &Scope) -> Option<&str> {
        route_scope(&self.domains, scope)
    }

    /// Sync options derived from the `sync` section
    pub fn sync_options(&self) -> SyncOptions {
        let sync = &self.sync;
        SyncOptions {
            dry_run: false,
            concurrency: sync.concurrency.max(1),
            retry: RetryPolicy::new(
                sync.retry_attempts,
                Duration::from_millis(sync.retry_base_delay_ms),
                Duration::from_millis(sync.retry_max_delay_ms),
            ),
            operation_timeout: (sync.operation_timeout_secs > 0)
                .then(|| Duration::from_secs(sync.operation_timeout_secs)),
        }
    }
}

/// Pick the domain for a scope
///
/// An explicit domain must be configured. A subtree without one goes to the
/// domain with the longest `base_dn` containing it, or to the only domain
/// when exactly one is configured.
pub fn route_scope<'a>(domains: &'a BTreeMap<String, DomainConfig>, scope: &Scope) -> Option<&'a str> {
    if let Some(name) = scope.domain() {
        return domains.get_key_value(name).map(|(k, _)| k.as_str());
    }

    let Scope::SubtreePath { dn, .. } = scope else {
        return None;
    };

    domains
        .iter()
        .filter(|(_, domain)| dn_is_within(dn, &domain.base_dn))
        .max_by_key(|(_, domain)| domain.base_dn.len())
        .map(|(name, _)| name.as_str())
        .or_else(|| {
            if domains.len() == 1 {
                domains.keys().next().map(String::as_str)
            } else {
                None
            }
        })
}

fn expand_env(value: &mut Value) -> Result<()> {
    match value {
        Value::String(s) if s.contains("${") => {
            let expanded = shellexpand::env(s.as_str())
                .map_err(|e| Error::config(e.to_string()))?
                .into_owned();
            *s = expanded;
        }
        Value::Array(items) => {
            for item in items {
                expand_env(item)?;
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                expand_env(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
poll_interval: 300
guardicore:
  management_url: cc.example.com
  username: svc-labeler
  password: hunter2
domains:
  corp:
    server: dc1.corp.local:636
    base_dn: DC=corp,DC=local
    bind_user: CN=svc,OU=Service,DC=corp,DC=local
    bind_password: secret
rules:
  zz-admins:
    target_dn: OU=Admins,DC=corp,DC=local
    labels:
      AD Admin: "Yes"
  aa-gold:
    domain: corp
    group: Gold Servers
    labels:
      Tier: Gold
"#;

    #[test]
    fn test_parse_yaml_sample() {
        let manifest = Manifest::parse(SAMPLE, ConfigFormat::Yaml).unwrap();

        assert_eq!(manifest.guardicore.management_url.as_deref(), Some("cc.example.com"));
        assert_eq!(manifest.guardicore.timeout_secs, 30);
        assert_eq!(manifest.domains["corp"].page_size, 250);
        assert_eq!(manifest.sync.concurrency, 4);

        let names: Vec<_> = manifest.rules.0.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["zz-admins", "aa-gold"]);
    }

    #[test]
    fn test_rule_set_routes_subtree_by_base_dn() {
        let manifest = Manifest::parse(SAMPLE, ConfigFormat::Yaml).unwrap();
        let rules = manifest.rule_set().unwrap();

        let admins = rules.get("zz-admins").unwrap();
        assert_eq!(manifest.domain_for(&admins.scope), Some("corp"));
    }

    #[test]
    fn test_unknown_domain_is_rejected() {
        let content = SAMPLE.replace("domain: corp", "domain: lab");
        let manifest = Manifest::parse(&content, ConfigFormat::Yaml).unwrap();

        let err = manifest.rule_set().unwrap_err();
        assert!(err.to_string().contains("unknown domain 'lab'"), "{}", err);
    }

    #[test]
    fn test_subtree_routing_prefers_longest_base_dn() {
        let content = r#"
[domains.root]
server = "dc1"
base_dn = "DC=corp,DC=local"
bind_user = "u"
bind_password = "p"

[domains.emea]
server = "dc2"
base_dn = "DC=emea,DC=corp,DC=local"
bind_user = "u"
bind_password = "p"
"#;
        let manifest = Manifest::parse(content, ConfigFormat::Toml).unwrap();
        let scope = Scope::subtree("OU=Servers,DC=emea,DC=corp,DC=local", None).unwrap();
        let outside = Scope::subtree("OU=Servers,DC=other,DC=net", None).unwrap();

        assert_eq!(manifest.domain_for(&scope), Some("emea"));
        assert_eq!(manifest.domain_for(&outside), None);
    }

    #[test]
    fn test_env_expansion() {
        // SAFETY: test-only variable with a unique name
        unsafe { std::env::set_var("LABELER_TEST_BIND_PASSWORD", "from-env") };
        let content = SAMPLE.replace("bind_password: secret", "bind_password: ${LABELER_TEST_BIND_PASSWORD}");

        let manifest = Manifest::parse(&content, ConfigFormat::Yaml).unwrap();
        assert_eq!(manifest.domains["corp"].bind_password, "from-env");
    }

    #[test]
    fn test_unset_env_variable_is_a_config_error() {
        let content = SAMPLE.replace("password: hunter2", "password: ${LABELER_TEST_SURELY_UNSET_VAR}");

        let err = Manifest::parse(&content, ConfigFormat::Yaml).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_platform_overrides() {
        let manifest = Manifest::parse(SAMPLE, ConfigFormat::Yaml)
            .unwrap()
            .with_platform_overrides(Some("other.example.com".into()), None, Some("pw".into()));

        assert_eq!(manifest.guardicore.management_url.as_deref(), Some("other.example.com"));
        assert_eq!(manifest.guardicore.username.as_deref(), Some("svc-labeler"));
        assert_eq!(manifest.guardicore.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let manifest = Manifest::parse(SAMPLE, ConfigFormat::Yaml).unwrap();
        let debug = format!("{:?}", manifest);

        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_sync_options_from_section() {
        let content = format!("{}\nsync:\n  concurrency: 0\n  retry_attempts: 5\n", SAMPLE);
        let options = Manifest::parse(&content, ConfigFormat::Yaml).unwrap().sync_options();

        assert_eq!(options.concurrency, 1);
        assert_eq!(options.retry.max_attempts, 5);
        assert_eq!(options.operation_timeout, Some(Duration::from_secs(60)));
        assert!(!options.dry_run);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path(Path::new("c.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("c.TOML")).unwrap(), ConfigFormat::Toml);
        assert!(ConfigFormat::from_path(Path::new("c.ini")).is_err());
    }
}
