//! Login flow strategies.
//!
//! A strategy performs the interactive part of the Authorization Code grant
//! for one kind of platform: open the authorization page, wait for the one
//! redirect that matches, exchange its code. The variant is chosen once when
//! the provider is built.
//!
//! | Variant | Redirect transport |
//! |---------|--------------------|
//! | [`LoginFlowStrategy::Web`] | Same-origin broadcast channel fed by the callback page |
//! | [`LoginFlowStrategy::NativeLoopback`] | HTTP listener on a loopback address |
//! | [`LoginFlowStrategy::Unsupported`] | None; every login resolves to "no client" |
//!
//! Every variant races against a [`CancellationToken`]. Cancellation and a
//! failed browser launch resolve to `Ok(None)`; transient resources (sockets,
//! channel subscriptions) are released on every exit path.

#[cfg(not(target_arch = "wasm32"))]
pub mod loopback;
pub mod unsupported;
pub mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use loopback::LoopbackFlow;
pub use unsupported::UnsupportedFlow;
pub use web::WebRedirectFlow;

use crate::error::Result;
use crate::oauth::{ClientHandle, GrantClient};
use bridge_traits::platform::PlatformSendSync;
use core_async::sync::CancellationToken;
use url::Url;

/// Progress callbacks for an interactive login.
pub trait LoginListener: PlatformSendSync {
    /// Called with the authorization URL right before it is opened, so a UI
    /// can offer it as a link in case the browser does not come up.
    fn on_authorization_url(&self, url: &Url);
}

pub enum LoginFlowStrategy {
    Web(WebRedirectFlow),
    #[cfg(not(target_arch = "wasm32"))]
    NativeLoopback(LoopbackFlow),
    Unsupported(UnsupportedFlow),
}

impl LoginFlowStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            LoginFlowStrategy::Web(_) => "web",
            #[cfg(not(target_arch = "wasm32"))]
            LoginFlowStrategy::NativeLoopback(_) => "native-loopback",
            LoginFlowStrategy::Unsupported(_) => "unsupported",
        }
    }

    /// Run the interactive flow.
    ///
    /// Returns `Ok(None)` when cancelled or when no browser could be opened.
    pub async fn run(
        &self,
        grant: &GrantClient,
        scopes: &[String],
        listener: Option<&dyn LoginListener>,
        cancel: &CancellationToken,
    ) -> Result<Option<ClientHandle>> {
        match self {
            LoginFlowStrategy::Web(flow) => flow.run(grant, scopes, listener, cancel).await,
            #[cfg(not(target_arch = "wasm32"))]
            LoginFlowStrategy::NativeLoopback(flow) => {
                flow.run(grant, scopes, listener, cancel).await
            }
            LoginFlowStrategy::Unsupported(flow) => flow.run().await,
        }
    }

    /// Application start hook.
    ///
    /// The web variant never returns when the current page is the redirect
    /// target: it forwards the page to the callback asset instead.
    pub async fn login_init(&self, grant: &GrantClient) -> Result<()> {
        match self {
            LoginFlowStrategy::Web(flow) => flow.login_init(grant.config()).await,
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for LoginFlowStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LoginFlowStrategy").field(&self.name()).finish()
    }
}

impl From<WebRedirectFlow> for LoginFlowStrategy {
    fn from(flow: WebRedirectFlow) -> Self {
        LoginFlowStrategy::Web(flow)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<LoopbackFlow> for LoginFlowStrategy {
    fn from(flow: LoopbackFlow) -> Self {
        LoginFlowStrategy::NativeLoopback(flow)
    }
}

impl From<UnsupportedFlow> for LoginFlowStrategy {
    fn from(flow: UnsupportedFlow) -> Self {
        LoginFlowStrategy::Unsupported(flow)
    }
}
