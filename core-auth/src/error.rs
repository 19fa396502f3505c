use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The authorization server rejected the request (`error` / `error_description`).
    #[error("Authentication failed: {code}{}", .description.as_ref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    Authentication {
        code: String,
        description: Option<String>,
    },

    #[error("Credential storage failed: {0}")]
    Storage(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    #[error("Authorization response state does not match the request")]
    StateMismatch,

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    pub fn authentication(code: impl Into<String>, description: Option<String>) -> Self {
        AuthError::Authentication {
            code: code.into(),
            description,
        }
    }

    /// `true` for errors reported by the authorization server itself.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, AuthError::Authentication { .. })
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
