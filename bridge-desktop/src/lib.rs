//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `SecureStore` using the `keyring` crate
//! - `UrlLauncher` using the `open` crate (system browser)
//! - `WindowController` as a no-op for headless or CLI hosts
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringSecureStore, ReqwestHttpClient, SystemBrowserLauncher};
//!
//! let http = ReqwestHttpClient::try_new()?;
//! let store = KeyringSecureStore::with_service_name("my-app");
//! let launcher = SystemBrowserLauncher;
//! ```

mod browser;
mod http;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use browser::{NoopWindowController, SystemBrowserLauncher};
pub use http::ReqwestHttpClient;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
