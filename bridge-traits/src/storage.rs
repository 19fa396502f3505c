//! Persistent storage for OAuth2 credentials.

use async_trait::async_trait;

use crate::{error::Result, platform::PlatformSendSync};

/// Key/value store for secrets that outlive the process.
///
/// Desktop hosts back this with the OS keychain (Keychain, Credential
/// Manager, Secret Service); browsers with origin-scoped `localStorage`.
/// Implementations never log stored values.
///
/// ```ignore
/// use bridge_traits::storage::SecureStore;
///
/// async fn forget(store: &dyn SecureStore) -> bridge_traits::error::Result<()> {
///     if let Some(stored) = store.get_secret("oauth2_credentials").await? {
///         tracing::debug!(len = stored.len(), "Dropping stored credentials");
///         store.delete_secret("oauth2_credentials").await?;
///     }
///     Ok(())
/// }
/// ```
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait SecureStore: PlatformSendSync {
    /// Store `value` under `key`, replacing any previous value.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;
}
