//! Credential persistence.
//!
//! One secure-storage entry under a fixed key holds the JSON form of
//! [`Credentials`]. The provider is the only writer while a login flow runs.

use crate::error::{AuthError, Result};
use crate::types::Credentials;
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Secure-storage key holding the serialized credentials.
pub const CREDENTIALS_KEY: &str = "oauth2_credentials";

#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
    key: String,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self::with_key(secure_store, CREDENTIALS_KEY)
    }

    /// Store under a custom key, e.g. one entry per configured identity provider.
    pub fn with_key(secure_store: Arc<dyn SecureStore>, key: impl Into<String>) -> Self {
        Self {
            secure_store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist `credentials`, replacing whatever was stored before.
    pub async fn store(&self, credentials: &Credentials) -> Result<()> {
        let payload = serde_json::to_vec(credentials).map_err(|e| {
            AuthError::Serialization(format!("Failed to serialize credentials: {}", e))
        })?;

        self.secure_store
            .set_secret(&self.key, &payload)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to persist credentials");
                AuthError::Storage(e.to_string())
            })?;

        debug!(scopes = ?credentials.scopes, "Persisted credentials");
        Ok(())
    }

    /// Read back stored credentials.
    ///
    /// Returns `Ok(None)` when nothing is stored, when the stored value cannot
    /// be parsed, or when it parses but is invalid. Invalid values are
    /// cleared before returning.
    pub async fn restore(&self) -> Result<Option<Credentials>> {
        let Some(payload) = self
            .secure_store
            .get_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to read stored credentials");
                AuthError::Storage(e.to_string())
            })?
        else {
            debug!("No stored credentials");
            return Ok(None);
        };

        let credentials: Credentials = match serde_json::from_slice(&payload) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "Stored credentials are unreadable, ignoring them");
                return Ok(None);
            }
        };

        if !credentials.is_valid() {
            info!("Stored credentials are invalid, clearing them");
            self.clear().await?;
            return Ok(None);
        }

        Ok(Some(credentials))
    }

    pub async fn clear(&self) -> Result<()> {
        self.secure_store
            .delete_secret(&self.key)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to clear stored credentials");
                AuthError::Storage(e.to_string())
            })?;
        debug!("Cleared stored credentials");
        Ok(())
    }
}
