//! Platform-specific helper abstractions used to keep trait bounds aligned with
//! the threading guarantees of each target.
//!
//! Native targets require `Send + Sync` to allow bridge implementations to be
//! shared freely across async tasks. WebAssembly builds, however, run entirely
//! on a single thread and cannot satisfy those bounds because browser-provided
//! objects (e.g., `web_sys` types) are not thread-safe. The helper traits below
//! make the required bounds conditional without duplicating every trait
//! definition.

use serde::{Deserialize, Serialize};

/// Marker trait that applies `Send + Sync` on native targets while becoming a
/// no-op on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSendSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSendSync for T where T: Send + Sync {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSendSync {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSendSync for T {}

/// Family of host the auth core is running on.
///
/// Drives two decisions: which `auth.platform.*.redirect_url` key applies and
/// which login-flow strategy gets constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Browser build; the redirect comes back to a page of the same origin.
    Web,
    /// Desktop or device build able to bind a loopback HTTP listener.
    Io,
    /// Anything else. Login is reported as unsupported.
    Other,
}

impl Platform {
    /// Platform of the current compilation target.
    pub fn current() -> Self {
        if cfg!(target_arch = "wasm32") {
            Platform::Web
        } else if cfg!(any(
            target_os = "linux",
            target_os = "macos",
            target_os = "windows",
            target_os = "freebsd"
        )) {
            Platform::Io
        } else {
            Platform::Other
        }
    }

    /// Key segment used under `auth.platform`.
    pub fn config_key(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Io => "io",
            Platform::Other => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_test_host_is_io() {
        assert_eq!(Platform::current(), Platform::Io);
    }

    #[test]
    fn config_keys() {
        assert_eq!(Platform::Web.config_key(), "web");
        assert_eq!(Platform::Io.config_key(), "io");
    }
}
