//! Error types for labeler-ldap

use labeler_core::DirectoryError;

/// Result type for labeler-ldap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to a directory server
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("Cannot connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Bind as '{user}' failed: {message}")]
    Bind { user: String, message: String },

    #[error("Domain '{name}' is not connected")]
    UnknownDomain { name: String },

    #[error("No configured domain answers for {scope}")]
    Unroutable { scope: String },

    #[error("Group '{group}' not found")]
    GroupNotFound { group: String },

    #[error("No such object: {base}")]
    NoSuchObject { base: String },
}

impl From<Error> for DirectoryError {
    fn from(err: Error) -> Self {
        match err {
            Error::GroupNotFound { .. } | Error::NoSuchObject { .. } => {
                DirectoryError::ScopeNotFound(err.to_string())
            }
            other => DirectoryError::Unavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_objects_map_to_scope_not_found() {
        let err: DirectoryError = Error::NoSuchObject {
            base: "OU=Gone,DC=corp,DC=local".into(),
        }
        .into();
        assert!(matches!(err, DirectoryError::ScopeNotFound(msg) if msg.contains("OU=Gone")));

        let err: DirectoryError = Error::GroupNotFound {
            group: "Gold Servers".into(),
        }
        .into();
        assert!(matches!(err, DirectoryError::ScopeNotFound(_)));
    }

    #[test]
    fn connection_problems_map_to_unavailable() {
        let err: DirectoryError = Error::Bind {
            user: "svc".into(),
            message: "invalidCredentials".into(),
        }
        .into();
        assert!(matches!(err, DirectoryError::Unavailable(msg) if msg.contains("svc")));
    }
}
