//! Rule set loading
//!
//! Rules keep the order they are declared in. That order is the label
//! precedence order: when two rules set the same key on one object, the rule
//! declared later wins.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use super::rule::{Rule, Scope, names_group};
use crate::labels::LabelSet;
use crate::{Error, Result};

/// A scalar label value as written in configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LabelValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One rule entry as written in configuration, before validation
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Subtree scope: DN of an OU or container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dn: Option<String>,
    /// Domain for a group scope, or routing hint for a subtree scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Group scope: group DN or common name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Labels to apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, LabelValue>>,
}

/// The `rules:` section, in declared order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RulesConfig(pub Vec<(String, RuleConfig)>);

impl<'de> Deserialize<'de> for RulesConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = RulesConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of rule names to rule definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, rule)) = map.next_entry::<String, RuleConfig>()? {
                    rules.push((name, rule));
                }
                Ok(RulesConfig(rules))
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(RulesConfig::default())
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

impl RulesConfig {
    pub fn push(&mut self, name: impl Into<String>, rule: RuleConfig) {
        self.0.push((name.into(), rule));
    }
}

/// Validated, ordered collection of rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Build and validate a rule set from its configuration section
    ///
    /// # Errors
    ///
    /// Returns an error if a rule has no scope, more than one scope, a
    /// malformed scope, missing or empty labels, or a duplicate name.
    pub fn load(config: &RulesConfig) -> Result<Self> {
        let rules = config
            .0
            .iter()
            .map(|(name, rule)| build_rule(name, rule))
            .collect::<Result<Vec<_>>>()?;
        Self::new(rules)
    }

    /// Build a rule set from already constructed rules
    ///
    /// # Errors
    ///
    /// Returns an error if names are not unique or a rule has no labels.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(Error::DuplicateRule {
                    name: rule.name.clone(),
                });
            }
            if rule.labels.is_empty() {
                return Err(Error::invalid_rule(&rule.name, "labels must not be empty"));
            }
        }
        Ok(Self { rules })
    }

    /// Rules in declared order
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn build_rule(name: &str, config: &RuleConfig) -> Result<Rule> {
    if name.trim().is_empty() {
        return Err(Error::config("rule names must not be empty"));
    }

    let scope = match (&config.target_dn, &config.group) {
        (Some(_), Some(_)) => {
            return Err(Error::invalid_rule(
                name,
                "declares both target_dn and group; exactly one scope is allowed",
            ));
        }
        (None, None) => {
            return Err(Error::invalid_rule(
                name,
                "missing scope: set target_dn, or domain and group",
            ));
        }
        (Some(dn), None) if names_group(dn) => {
            let domain = config.domain.as_deref().ok_or_else(|| {
                Error::invalid_rule(name, "a group target_dn (CN=...) requires a domain")
            })?;
            Scope::group(domain, dn).ok_or_else(|| {
                Error::invalid_rule(name, format!("malformed target_dn '{}'", dn))
            })?
        }
        (Some(dn), None) => Scope::subtree(dn, config.domain.clone())
            .ok_or_else(|| Error::invalid_rule(name, format!("malformed target_dn '{}'", dn)))?,
        (None, Some(group)) => {
            let domain = config
                .domain
                .as_deref()
                .ok_or_else(|| Error::invalid_rule(name, "group scope requires a domain"))?;
            Scope::group(domain, group).ok_or_else(|| {
                Error::invalid_rule(
                    name,
                    format!("malformed group scope '{}' in domain '{}'", group, domain),
                )
            })?
        }
    };

    let labels = config
        .labels
        .as_ref()
        .ok_or_else(|| Error::invalid_rule(name, "missing labels"))?;

    let mut label_set = LabelSet::new();
    for (key, value) in labels {
        if key.trim().is_empty() {
            return Err(Error::invalid_rule(name, "label keys must not be empty"));
        }
        label_set.insert(key.clone(), value.to_string());
    }

    if label_set.is_empty() {
        return Err(Error::invalid_rule(name, "labels must not be empty"));
    }

    Ok(Rule::new(name, scope, label_set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn labels(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, LabelValue>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), LabelValue::Text(v.to_string())))
                .collect(),
        )
    }

    fn subtree_rule(dn: &str) -> RuleConfig {
        RuleConfig {
            target_dn: Some(dn.to_string()),
            labels: labels(&[("AD Admin", "Yes")]),
            ..Default::default()
        }
    }

    #[test]
    fn test_load_preserves_declared_order() {
        let mut config = RulesConfig::default();
        config.push("zeta", subtree_rule("OU=Z,DC=corp"));
        config.push("alpha", subtree_rule("OU=A,DC=corp"));

        let set = RuleSet::load(&config).unwrap();
        let names: Vec<_> = set.rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_load_group_scope() {
        let mut config = RulesConfig::default();
        config.push(
            "tier",
            RuleConfig {
                domain: Some("corp".into()),
                group: Some("Gold Servers".into()),
                labels: labels(&[("Tier", "Gold")]),
                ..Default::default()
            },
        );

        let set = RuleSet::load(&config).unwrap();
        let rule = set.get("tier").unwrap();
        assert_eq!(
            rule.scope,
            Scope::GroupMembership {
                domain: "corp".into(),
                group: "Gold Servers".into()
            }
        );
        assert_eq!(rule.labels.get("Tier").map(String::as_str), Some("Gold"));
    }

    #[test]
    fn test_cn_target_dn_is_group_membership() {
        let mut config = RulesConfig::default();
        config.push(
            "domain-admins",
            RuleConfig {
                domain: Some("corp".into()),
                ..subtree_rule("CN=Domain Admins,CN=Users,DC=corp,DC=local")
            },
        );

        let set = RuleSet::load(&config).unwrap();
        assert_eq!(
            set.get("domain-admins").unwrap().scope,
            Scope::GroupMembership {
                domain: "corp".into(),
                group: "CN=Domain Admins,CN=Users,DC=corp,DC=local".into()
            }
        );
    }

    #[test]
    fn test_cn_target_dn_without_domain_is_rejected() {
        let mut config = RulesConfig::default();
        config.push("admins", subtree_rule("CN=Domain Admins,CN=Users,DC=corp"));

        let err = RuleSet::load(&config).unwrap_err();
        assert!(err.to_string().contains("requires a domain"), "{}", err);
    }

    #[test]
    fn test_missing_scope_is_rejected() {
        let mut config = RulesConfig::default();
        config.push(
            "no-scope",
            RuleConfig {
                labels: labels(&[("A", "B")]),
                ..Default::default()
            },
        );

        let err = RuleSet::load(&config).unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("missing scope"), "{}", err);
    }

    #[test]
    fn test_both_scopes_are_rejected() {
        let mut config = RulesConfig::default();
        config.push(
            "two-scopes",
            RuleConfig {
                target_dn: Some("OU=A,DC=corp".into()),
                domain: Some("corp".into()),
                group: Some("Gold".into()),
                labels: labels(&[("A", "B")]),
            },
        );

        assert!(matches!(
            RuleSet::load(&config),
            Err(Error::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_group_without_domain_is_rejected() {
        let mut config = RulesConfig::default();
        config.push(
            "orphan-group",
            RuleConfig {
                group: Some("Gold".into()),
                labels: labels(&[("A", "B")]),
                ..Default::default()
            },
        );

        let err = RuleSet::load(&config).unwrap_err();
        assert!(err.to_string().contains("requires a domain"), "{}", err);
    }

    #[test]
    fn test_malformed_dn_is_rejected() {
        let mut config = RulesConfig::default();
        config.push("bad", subtree_rule("Admins"));

        let err = RuleSet::load(&config).unwrap_err();
        assert!(err.to_string().contains("malformed target_dn"), "{}", err);
    }

    #[test]
    fn test_missing_and_empty_labels_are_rejected() {
        let mut config = RulesConfig::default();
        config.push(
            "no-labels",
            RuleConfig {
                target_dn: Some("OU=A,DC=corp".into()),
                ..Default::default()
            },
        );
        assert!(RuleSet::load(&config).unwrap_err().to_string().contains("missing labels"));

        let mut config = RulesConfig::default();
        config.push(
            "empty-labels",
            RuleConfig {
                target_dn: Some("OU=A,DC=corp".into()),
                labels: Some(BTreeMap::new()),
                ..Default::default()
            },
        );
        assert!(RuleSet::load(&config).unwrap_err().to_string().contains("must not be empty"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let rule = Rule::new(
            "dup",
            Scope::subtree("OU=A,DC=corp", None).unwrap(),
            LabelSet::from([("A".to_string(), "B".to_string())]),
        );

        let err = RuleSet::new(vec![rule.clone(), rule]).unwrap_err();
        assert!(matches!(err, Error::DuplicateRule { name } if name == "dup"));
    }

    #[test]
    fn test_scalar_label_values_are_stringified() {
        let yaml = r#"
servers:
  target_dn: OU=Servers,DC=corp
  labels:
    Critical: true
    Priority: 2
    Owner: ops
"#;
        let config: RulesConfig = serde_yaml::from_str(yaml).unwrap();
        let set = RuleSet::load(&config).unwrap();
        let rule = set.get("servers").unwrap();

        assert_eq!(rule.labels["Critical"], "true");
        assert_eq!(rule.labels["Priority"], "2");
        assert_eq!(rule.labels["Owner"], "ops");
    }
}
