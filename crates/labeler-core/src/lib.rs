//! Rule evaluation and label reconciliation for directory-driven asset labeling
//!
//! This crate turns declarative labeling rules into label changes on a
//! segmentation platform:
//!
//! - **Rules**: named mappings from a directory scope (OU subtree or group
//!   membership) to a set of labels, kept in declared order
//! - **Capabilities**: [`MembershipProvider`] resolves scopes to objects,
//!   [`LabelStore`] reads and writes asset labels
//! - **Reconciliation**: merges every matching rule into one desired label
//!   set per object and writes only what differs, once per object
//! - **Configuration**: the manifest file with domains, platform settings,
//!   sync tuning and rules
//!
//! # Architecture
//!
//! ```text
//!                 labeler-cli
//!                      |
//!                 labeler-core
//!                /            \
//!     labeler-ldap          labeler-centra
//!  (MembershipProvider)      (LabelStore)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use labeler_core::{Manifest, SyncDriver};
//!
//! let manifest = Manifest::load(path)?;
//! let rules = manifest.rule_set()?;
//! let driver = SyncDriver::new(directory, store, manifest.sync_options());
//! let summary = driver.run(&rules).await?;
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod labels;
pub mod retry;
pub mod rules;
pub mod sync;

pub use config::{DomainConfig, Manifest, PlatformSection};
pub use directory::{DirectoryError, DirectoryObject, MembershipProvider};
pub use error::{Error, Result};
pub use labels::{LabelSet, LabelStore, LabelStoreError, compute_delta};
pub use retry::{RetryPolicy, RetryingLabelStore};
pub use rules::{Rule, RuleSet, Scope};
pub use sync::{
    ObjectOutcome, OutcomeKind, RuleReport, SyncDriver, SyncOptions, SyncSummary,
};
