//! Configuration loading
//!
//! A single manifest file describes everything one run needs:
//!
//! 1. **guardicore** - label platform endpoint and credentials
//! 2. **domains** - directory servers, keyed by name
//! 3. **sync** - concurrency, retry and timeout tuning
//! 4. **rules** - labeling rules, in precedence order
//!
//! # Example
//!
//! ```ignore
//! use labeler_core::config::Manifest;
//!
//! let manifest = Manifest::load(Path::new("config.yml"))?;
//! let rules = manifest.rule_set()?;
//! let options = manifest.sync_options();
//! ```

mod manifest;

pub use manifest::{
    ConfigFormat, DomainConfig, Manifest, PlatformSection, SyncSection, route_scope,
};
