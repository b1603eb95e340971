//! Error types for labeler-centra

use labeler_core::LabelStoreError;

/// Result type for labeler-centra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to the label platform
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Incorrect platform username or password")]
    InvalidCredentials,

    #[error("The platform account requires MFA; use an account without MFA")]
    MfaRequired,

    #[error("Not authenticated; call authenticate() first")]
    NotAuthenticated,

    #[error("Missing platform setting: {name}")]
    MissingSetting { name: &'static str },

    #[error("Invalid management URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status of a failed response, if the platform answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<Error> for LabelStoreError {
    fn from(err: Error) -> Self {
        match err.status() {
            Some(401) => LabelStoreError::AuthExpired(err.to_string()),
            Some(404) => LabelStoreError::AssetNotFound(err.to_string()),
            _ => match err {
                Error::NotAuthenticated | Error::InvalidCredentials | Error::MfaRequired => {
                    LabelStoreError::AuthExpired(err.to_string())
                }
                other => LabelStoreError::Rejected(other.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn status(code: u16) -> Error {
        Error::Status {
            status: code,
            body: String::new(),
        }
    }

    #[rstest]
    #[case(401, "auth")]
    #[case(404, "missing")]
    #[case(429, "rejected")]
    #[case(500, "rejected")]
    #[case(503, "rejected")]
    #[case(400, "rejected")]
    fn test_status_mapping(#[case] code: u16, #[case] expected: &str) {
        let mapped = LabelStoreError::from(status(code));
        let kind = match mapped {
            LabelStoreError::AuthExpired(_) => "auth",
            LabelStoreError::AssetNotFound(_) => "missing",
            LabelStoreError::Rejected(_) => "rejected",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_missing_session_is_auth_expired() {
        assert!(matches!(
            LabelStoreError::from(Error::NotAuthenticated),
            LabelStoreError::AuthExpired(_)
        ));
    }

    #[test]
    fn test_decode_errors_are_retryable() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(LabelStoreError::from(Error::Decode(err)).is_retryable());
    }
}
