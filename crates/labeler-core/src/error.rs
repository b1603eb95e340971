//! Error types for labeler-core

use std::path::PathBuf;

/// Result type for labeler-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in labeler-core operations
///
/// Only the fatal categories live here. Per-object failures (missing assets,
/// rejected mutations) are recorded as outcomes in the sync summary instead
/// of being propagated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file not found at expected path
    #[error("Configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration could not be parsed or is structurally invalid
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// A single rule is malformed
    #[error("Invalid rule '{rule}': {message}")]
    InvalidRule { rule: String, message: String },

    /// Two rules share the same name
    #[error("Duplicate rule name: {name}")]
    DuplicateRule { name: String },

    /// The directory could not be reached or refused the bind
    #[error("Directory unavailable: {message}")]
    DirectoryUnavailable { message: String },

    /// The label platform session is no longer valid
    #[error("Authentication expired: {message}")]
    AuthExpired { message: String },

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Whether this error belongs to the pre-run configuration category
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::Config { .. }
                | Self::InvalidRule { .. }
                | Self::DuplicateRule { .. }
        )
    }
}
