//! Workspace umbrella crate.
//!
//! Maps the `desktop-shims` and `wasm` feature flags onto `core-service` so a
//! host application can depend on `auth-workspace` alone and pick its
//! platform bridges with one feature.

#[cfg(any(feature = "desktop-shims", feature = "wasm"))]
pub use core_service::*;
