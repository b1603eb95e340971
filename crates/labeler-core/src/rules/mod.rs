//! Labeling rules
//!
//! A rule maps a directory scope (subtree or group membership) to the labels
//! every matching object should carry.

mod rule;
mod set;

pub use rule::{Rule, Scope, dn_is_within, is_valid_dn, looks_like_dn, names_group};
pub use set::{LabelValue, RuleConfig, RuleSet, RulesConfig};
