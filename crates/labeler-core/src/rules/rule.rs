//! Rule and scope types
//!
//! A Rule maps one directory scope to a fixed set of labels. Rules are built
//! once from configuration and never change during a run.

use std::fmt;

use serde::Serialize;

use crate::labels::LabelSet;

/// Directory-membership selector of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// Every computer object below a distinguished name
    SubtreePath {
        dn: String,
        /// Optional name of the configured domain that hosts `dn`
        #[serde(skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
    },
    /// Every computer object that is a member of a group in a domain
    ///
    /// `group` is either a group DN or a plain common name.
    GroupMembership { domain: String, group: String },
}

impl Scope {
    /// Build a subtree scope, validating the DN
    pub fn subtree(dn: impl Into<String>, domain: Option<String>) -> Option<Self> {
        let dn = dn.into().trim().to_string();
        if !is_valid_dn(&dn) {
            return None;
        }
        Some(Self::SubtreePath { dn, domain })
    }

    /// Build a group scope, validating both parts
    pub fn group(domain: impl Into<String>, group: impl Into<String>) -> Option<Self> {
        let domain = domain.into().trim().to_string();
        let group = group.into().trim().to_string();
        if domain.is_empty() || group.is_empty() {
            return None;
        }
        if looks_like_dn(&group) && !is_valid_dn(&group) {
            return None;
        }
        Some(Self::GroupMembership { domain, group })
    }

    /// The configured domain this scope names, if any
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::SubtreePath { domain, .. } => domain.as_deref(),
            Self::GroupMembership { domain, .. } => Some(domain),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubtreePath { dn, .. } => write!(f, "subtree {}", dn),
            Self::GroupMembership { domain, group } => write!(f, "group {} in {}", group, domain),
        }
    }
}

/// A named labeling rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// Unique name within a rule set
    pub name: String,
    /// Which directory objects the rule matches
    pub scope: Scope,
    /// Labels applied verbatim to every matched object (never empty)
    pub labels: LabelSet,
}

impl Rule {
    pub fn new(name: impl Into<String>, scope: Scope, labels: LabelSet) -> Self {
        Self {
            name: name.into(),
            scope,
            labels,
        }
    }
}

/// Whether a value is written in DN form (`attr=value,...`) rather than a bare name
pub fn looks_like_dn(value: &str) -> bool {
    value
        .split_once('=')
        .is_some_and(|(attr, _)| !attr.is_empty() && attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}

/// Check that a distinguished name is a comma-separated list of `attr=value` parts
///
/// Escaped commas (`\,`) inside values are allowed.
pub fn is_valid_dn(dn: &str) -> bool {
    let dn = dn.trim();
    if dn.is_empty() {
        return false;
    }

    split_rdns(dn).into_iter().all(|rdn| {
        let Some((attr, value)) = rdn.split_once('=') else {
            return false;
        };
        let attr = attr.trim();
        !attr.is_empty()
            && attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !value.trim().is_empty()
    })
}

fn split_rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in dn.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                parts.push(&dn[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(&dn[start..]);
    parts
}

/// Whether a DN names a group object rather than a container
///
/// A leading `CN=` RDN is a group; `OU=` and `DC=` are subtrees.
pub fn names_group(dn: &str) -> bool {
    split_rdns(dn.trim())
        .first()
        .and_then(|rdn| rdn.split_once('='))
        .is_some_and(|(attr, _)| attr.trim().eq_ignore_ascii_case("cn"))
}

/// Case-insensitive check that `dn` lies at or below `base`
pub fn dn_is_within(dn: &str, base: &str) -> bool {
    let normalize = |s: &str| {
        split_rdns(s)
            .into_iter()
            .map(|rdn| rdn.trim().to_ascii_lowercase())
            .collect::<Vec<_>>()
    };
    let dn = normalize(dn);
    let base = normalize(base);
    !base.is_empty() && dn.len() >= base.len() && dn[dn.len() - base.len()..] == base[..]
}
