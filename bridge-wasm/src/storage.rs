//! `localStorage`-backed [`SecureStore`] for browser builds.
//!
//! Every value is sealed with AES-256-GCM before it is written. The key is
//! generated on first use and kept next to the data, so this only keeps
//! tokens out of casual inspection of the storage panel. Script running on
//! the same origin can still read them.
//!
//! Layout under a namespace `ns`:
//!
//! ```text
//! ns::key                  base64(aes key)
//! ns::secret::<name>       base64(nonce || ciphertext)
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bridge_traits::{
    error::{BridgeError, Result as BridgeResult},
    storage::SecureStore,
};
use rand::{rngs::OsRng, RngCore};
use tracing::warn;
use web_sys::Storage;

use crate::error::{js_error, window};

const NONCE_LEN: usize = 12;

fn failed(what: &str, err: impl std::fmt::Display) -> BridgeError {
    BridgeError::OperationFailed(format!("{what}: {err}"))
}

/// Encrypts and decrypts stored values.
#[derive(Clone)]
struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    /// A key that cannot be decoded is replaced. Secrets sealed with it then
    /// read as absent.
    fn load_or_create(storage: &Storage, slot: &str) -> BridgeResult<Self> {
        let existing = storage
            .get_item(slot)
            .map_err(|err| js_error("read storage key", err))?;

        if let Some(encoded) = existing {
            match Self::from_encoded(&encoded) {
                Ok(sealer) => return Ok(sealer),
                Err(err) => warn!(slot, error = %err, "Replacing unreadable storage key"),
            }
        }

        let mut fresh = vec![0u8; 32];
        OsRng.fill_bytes(&mut fresh);
        storage
            .set_item(slot, &BASE64.encode(&fresh))
            .map_err(|err| js_error("write storage key", err))?;
        Self::from_key(&fresh)
    }

    fn from_encoded(encoded: &str) -> BridgeResult<Self> {
        let key = BASE64
            .decode(encoded)
            .map_err(|err| failed("decode storage key", err))?;
        Self::from_key(&key)
    }

    fn from_key(key: &[u8]) -> BridgeResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|err| failed("storage key", err))?;
        Ok(Self { cipher })
    }

    fn seal(&self, plaintext: &[u8]) -> BridgeResult<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let mut sealed = nonce.to_vec();
        sealed.extend(
            self.cipher
                .encrypt(Nonce::from_slice(&nonce), plaintext)
                .map_err(|err| failed("encrypt secret", err))?,
        );
        Ok(BASE64.encode(sealed))
    }

    fn open(&self, encoded: &str) -> BridgeResult<Vec<u8>> {
        let sealed = BASE64
            .decode(encoded)
            .map_err(|err| failed("decode secret", err))?;
        if sealed.len() <= NONCE_LEN {
            return Err(BridgeError::OperationFailed("stored secret is truncated".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|err| failed("decrypt secret", err))
    }
}

/// Encrypted browser storage scoped to one namespace.
#[derive(Clone)]
pub struct WasmSecureStore {
    storage: Storage,
    namespace: String,
    sealer: Sealer,
}

impl WasmSecureStore {
    /// Open (or initialize) the store for `namespace`.
    ///
    /// Fails with `NotAvailable` when `localStorage` is disabled.
    pub fn new(namespace: impl Into<String>) -> BridgeResult<Self> {
        let namespace = namespace.into();
        let storage = window()?
            .local_storage()
            .map_err(|err| js_error("localStorage", err))?
            .ok_or_else(|| BridgeError::NotAvailable("localStorage".into()))?;
        let sealer = Sealer::load_or_create(&storage, &format!("{namespace}::key"))?;
        Ok(Self {
            storage,
            namespace,
            sealer,
        })
    }

    fn slot(&self, key: &str) -> String {
        format!("{}::secret::{}", self.namespace, key)
    }
}

#[async_trait(?Send)]
impl SecureStore for WasmSecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        let sealed = self.sealer.seal(value)?;
        self.storage
            .set_item(&self.slot(key), &sealed)
            .map_err(|err| js_error("set_item", err))
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        let slot = self.slot(key);
        let Some(sealed) = self
            .storage
            .get_item(&slot)
            .map_err(|err| js_error("get_item", err))?
        else {
            return Ok(None);
        };

        match self.sealer.open(&sealed) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key, error = %err, "Discarding unreadable secret");
                self.storage
                    .remove_item(&slot)
                    .map_err(|err| js_error("remove_item", err))?;
                Ok(None)
            }
        }
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.storage
            .remove_item(&self.slot(key))
            .map_err(|err| js_error("remove_item", err))
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

    fn namespace(prefix: &str) -> String {
        format!("{prefix}-{}", js_sys::Date::now())
    }

    #[wasm_bindgen_test]
    async fn test_credentials_survive_reopen() {
        let ns = namespace("reopen");
        let first = WasmSecureStore::new(ns.clone()).unwrap();
        first.set_secret("oauth2_credentials", b"{\"accessToken\":\"at\"}").await.unwrap();

        let second = WasmSecureStore::new(ns).unwrap();
        assert_eq!(
            second.get_secret("oauth2_credentials").await.unwrap(),
            Some(b"{\"accessToken\":\"at\"}".to_vec())
        );

        second.delete_secret("oauth2_credentials").await.unwrap();
        assert!(first.get_secret("oauth2_credentials").await.unwrap().is_none());
    }

    #[wasm_bindgen_test]
    async fn test_values_are_not_stored_in_clear() {
        let ns = namespace("sealed");
        let store = WasmSecureStore::new(ns.clone()).unwrap();
        store.set_secret("token", b"plain-access-token").await.unwrap();

        let raw = store.storage.get_item(&store.slot("token")).unwrap().unwrap();
        assert!(!raw.contains("plain-access-token"));
    }

    #[wasm_bindgen_test]
    async fn test_tampered_value_reads_as_absent() {
        let store = WasmSecureStore::new(namespace("tamper")).unwrap();
        store.storage.set_item(&store.slot("token"), "AAAA").unwrap();

        assert_eq!(store.get_secret("token").await.unwrap(), None);
        assert!(store.storage.get_item(&store.slot("token")).unwrap().is_none());
    }

    #[wasm_bindgen_test]
    async fn test_lost_key_drops_sealed_secrets() {
        let ns = namespace("rotated");
        let first = WasmSecureStore::new(ns.clone()).unwrap();
        first.set_secret("oauth2_credentials", b"{\"accessToken\":\"at\"}").await.unwrap();
        first.storage.remove_item(&format!("{ns}::key")).unwrap();

        let second = WasmSecureStore::new(ns).unwrap();
        assert_eq!(second.get_secret("oauth2_credentials").await.unwrap(), None);

        second.set_secret("oauth2_credentials", b"fresh").await.unwrap();
        assert_eq!(
            second.get_secret("oauth2_credentials").await.unwrap(),
            Some(b"fresh".to_vec())
        );
    }

    #[wasm_bindgen_test]
    async fn test_corrupt_key_is_replaced() {
        let ns = namespace("badkey");
        let storage = window().unwrap().local_storage().unwrap().unwrap();
        storage.set_item(&format!("{ns}::key"), "not base64!").unwrap();

        let store = WasmSecureStore::new(ns.clone()).unwrap();
        store.set_secret("token", b"at").await.unwrap();
        assert_eq!(store.get_secret("token").await.unwrap(), Some(b"at".to_vec()));
        assert_ne!(storage.get_item(&format!("{ns}::key")).unwrap().unwrap(), "not base64!");
    }
}
