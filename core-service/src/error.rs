use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors surfaced by [`AuthService`](crate::AuthService).
#[derive(Error, Debug)]
pub enum CoreError {
    /// The selected login flow needs a bridge the host did not provide.
    #[error("Missing {capability} bridge: {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] core_runtime::Error),

    /// A default bridge could not be constructed.
    #[error("Bridge setup failed: {0}")]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Auth(#[from] core_auth::AuthError),
}

impl CoreError {
    pub(crate) fn missing(capability: &str, message: impl Into<String>) -> Self {
        CoreError::CapabilityMissing {
            capability: capability.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
