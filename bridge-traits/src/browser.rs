//! Browser and window integration used by the interactive login flows.
//!
//! - [`UrlLauncher`] opens the authorization page (system browser, in-app
//!   tab, popup window)
//! - [`WindowController`] lets desktop hosts step aside while the user is in
//!   the browser
//! - [`RedirectChannel`] delivers the redirect URL seen by another page of the
//!   same origin
//! - [`PageLocation`] reads and replaces the URL of the current page (web only)

use async_trait::async_trait;

use crate::{error::Result, platform::PlatformSendSync};

/// Opens URLs outside the application.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait UrlLauncher: PlatformSendSync {
    /// Open `url` with the platform's browser mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error when no browser could be started.
    async fn open_url(&self, url: &str) -> Result<()>;
}

/// Host window control for desktop login flows.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait WindowController: PlatformSendSync {
    async fn minimize(&self) -> Result<()>;

    /// Bring the host window back and give it keyboard focus.
    async fn restore_and_focus(&self) -> Result<()>;
}

/// Same-origin message channel carrying redirect URLs.
///
/// On the web the authorization server redirects a secondary page (popup or
/// tab). That page posts its full location to the channel and the page that
/// started the login receives it here.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait RedirectChannel: PlatformSendSync {
    /// Wait for the next URL posted to the channel.
    async fn next_redirect(&self) -> Result<String>;

    /// Release the underlying listener. Called on every exit path of a flow.
    fn close(&self) {}
}

/// Location of the current page.
pub trait PageLocation: PlatformSendSync {
    /// Absolute URL of the current page.
    fn current_url(&self) -> Result<String>;

    /// Replace the current page with `url`.
    fn replace(&self, url: &str) -> Result<()>;
}
