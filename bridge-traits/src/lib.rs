//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the authentication core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that must be implemented differently per platform
//! (desktop, web).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Token endpoint requests
//!
//! ### Security & Storage
//! - [`SecureStore`](storage::SecureStore) - Credential persistence (Keychain/Secret Service/localStorage)
//!
//! ### Browser Integration
//! - [`UrlLauncher`](browser::UrlLauncher) - Open the authorization page
//! - [`WindowController`](browser::WindowController) - Minimize/restore the host window
//! - [`RedirectChannel`](browser::RedirectChannel) - Receive redirects from a sibling page
//! - [`PageLocation`](browser::PageLocation) - Current page URL (web)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Web      | `bridge-wasm`       |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations convert their native errors into it with an actionable
//! message and never include secret values in it.
//!
//! ## Thread Safety
//!
//! Native builds require `Send + Sync` on every bridge (see
//! [`platform::PlatformSendSync`]); WebAssembly builds drop the bound because
//! browser objects are single-threaded.

pub mod browser;
pub mod error;
pub mod http;
pub mod platform;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use browser::{PageLocation, RedirectChannel, UrlLauncher, WindowController};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use platform::{Platform, PlatformSendSync};
pub use storage::SecureStore;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
