use thiserror::Error;

/// Failure reported by a host bridge.
///
/// `core-auth` reports any failure of the HTTP bridge as a network error and
/// any failure of the secure store as a storage error.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The host cannot provide this capability at all (no keychain, no
    /// browser window).
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// Transport failure or timeout. The request may be retried.
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
