//! # Authentication Module
//!
//! OAuth2 Authorization Code (OIDC) login for applications built on the
//! `core-*` / `bridge-*` stack.
//!
//! ## Overview
//!
//! - [`OAuth2Provider`]: login state machine, credential restore / refresh /
//!   persistence and expiration monitoring
//! - [`strategy`]: platform login flows (browser redirect, loopback listener)
//! - [`CredentialStore`]: credentials in platform secure storage
//! - [`GrantClient`]: authorization URL with PKCE, code exchange, refresh
//! - [`AuthHooks`]: application callbacks (user factory, login / logout,
//!   resource grants)
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::{AuthController, LoopbackFlow, OAuth2Provider};
//! use core_runtime::config::AuthConfig;
//! use std::sync::Arc;
//! # use bridge_traits::{HttpClient, SecureStore, UrlLauncher, WindowController};
//! # async fn example(
//! #     http: Arc<dyn HttpClient>,
//! #     store: Arc<dyn SecureStore>,
//! #     launcher: Arc<dyn UrlLauncher>,
//! #     window: Arc<dyn WindowController>,
//! # ) -> core_auth::Result<()> {
//! let config = AuthConfig::builder()
//!     .authorization_endpoint("https://idp.example.com/authorize")
//!     .token_endpoint("https://idp.example.com/token")
//!     .client_id("desktop-app")
//!     .build()?;
//!
//! let hooks = AuthController::new(|claims| {
//!     claims.get("email").and_then(|v| v.as_str()).unwrap_or_default().to_string()
//! });
//!
//! let provider = OAuth2Provider::builder(Arc::new(config), Arc::new(hooks))
//!     .strategy(LoopbackFlow::new(launcher, window))
//!     .http_client(http)
//!     .secure_store(store)
//!     .build()?;
//!
//! if provider.login(None).await? {
//!     println!("Signed in as {:?}", provider.user().await);
//! }
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod credential_store;
pub mod error;
pub mod oauth;
pub mod provider;
pub mod redirect;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod test_support;

pub use controller::{AuthController, AuthHooks};
pub use credential_store::{CredentialStore, CREDENTIALS_KEY};
pub use error::{AuthError, Result};
pub use oauth::{ClientHandle, GrantClient, PendingGrant, PkceVerifier};
pub use provider::{OAuth2Provider, OAuth2ProviderBuilder};
#[cfg(not(target_arch = "wasm32"))]
pub use strategy::LoopbackFlow;
pub use strategy::{LoginFlowStrategy, LoginListener, UnsupportedFlow, WebRedirectFlow};
pub use types::{Claims, Credentials, LoginState};
