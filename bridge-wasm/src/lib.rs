//! WebAssembly Bridge Implementations
//!
//! Browser implementations of the bridge traits defined in `bridge-traits`,
//! built on `web-sys` and `wasm-bindgen`.
//!
//! # Platform Support
//!
//! This crate is designed exclusively for the `wasm32-unknown-unknown` target.
//! It compiles to an empty crate elsewhere.
//!
//! # Implementations
//!
//! - [`WasmHttpClient`]: `fetch`-based token endpoint client
//! - [`WasmSecureStore`]: AES-GCM encrypted `localStorage`
//! - [`PopupLauncher`]: opens the authorization page in a new browsing context
//! - [`BroadcastRedirectChannel`]: receives redirect URLs from the callback page
//! - [`WindowLocation`]: current page URL and navigation
//!
//! # Examples
//!
//! ```ignore
//! use bridge_wasm::{BroadcastRedirectChannel, PopupLauncher, WasmSecureStore};
//!
//! let store = WasmSecureStore::new("my-app")?;
//! let channel = BroadcastRedirectChannel::default();
//! ```

#![cfg(target_arch = "wasm32")]
#![warn(missing_docs)]

pub mod browser;
pub mod error;
pub mod http;
pub mod storage;

// Re-export commonly used types
pub use browser::{BroadcastRedirectChannel, PopupLauncher, WindowLocation};
pub use http::WasmHttpClient;
pub use storage::WasmSecureStore;
