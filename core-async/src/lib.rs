//! Runtime-agnostic async facade for the authentication core.
//!
//! The `core-*` crates never name Tokio directly. They spawn background work,
//! sleep until token expiry and race login flows against cancellation through
//! this crate, which maps onto:
//! - Native platforms (desktop): the Tokio runtime
//! - WebAssembly: the browser event loop via `wasm-bindgen-futures`
//!
//! # Modules
//!
//! - `task`: fire-and-forget and joinable task spawning
//! - `time`: `sleep`, `sleep_until` and wall-clock helpers
//! - `sync`: async locks, channels and [`sync::CancellationToken`]
//! - `runtime`: `block_on` for synchronous entry points
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.child_token();
//!
//!     core_async::task::spawn(async move {
//!         tokio::select! {
//!             _ = child.cancelled() => {}
//!             _ = sleep(Duration::from_secs(30)) => {}
//!         }
//!     });
//!
//!     token.cancel();
//! }
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::spawn;
pub use time::{sleep, Duration};
