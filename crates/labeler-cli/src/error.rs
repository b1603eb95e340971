//! Error types for labeler-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration or run-ending sync error
    #[error(transparent)]
    Core(#[from] labeler_core::Error),

    /// Directory connection error
    #[error(transparent)]
    Ldap(#[from] labeler_ldap::Error),

    /// Label platform error
    #[error(transparent)]
    Centra(#[from] labeler_centra::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Interactive prompt error
    #[error("Interactive prompt error: {0}")]
    Dialoguer(#[from] dialoguer::Error),

    /// Summary serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
