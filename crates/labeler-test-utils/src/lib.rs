//! Shared test utilities for the ad-labeler workspace.
//!
//! This crate provides in-memory stand-ins for both external capabilities so
//! engine and driver tests run without a directory server or a label
//! platform. It is a dev-dependency only and is never published.
//!
//! # Modules
//!
//! - [`directory`]: [`FakeDirectory`] scope-to-members table
//! - [`store`]: [`FakeLabelStore`] with call recording and failure injection

pub mod directory;
pub mod store;

pub use directory::FakeDirectory;
pub use store::{FakeLabelStore, StoreCall};

use labeler_core::{DirectoryObject, LabelSet};

/// A computer object named `name` in the `Servers` OU of `corp.local`
pub fn host(name: &str) -> DirectoryObject {
    DirectoryObject::new(format!("CN={},OU=Servers,DC=corp,DC=local", name), name)
}

/// Build a label set from key/value pairs
pub fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
