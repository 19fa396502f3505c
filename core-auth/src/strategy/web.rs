//! Browser redirect flow.
//!
//! The authorization page opens in a popup or new tab. When the identity
//! provider redirects back, the app loaded in that tab sees it is on the
//! redirect URL ([`WebRedirectFlow::login_init`]) and forwards itself to the
//! static callback asset, which posts its location on a same-origin
//! broadcast channel. The tab that started the login receives it through
//! [`RedirectChannel`].

use super::LoginListener;
use crate::error::{AuthError, Result};
use crate::oauth::{ClientHandle, GrantClient};
use crate::redirect::{matches_redirect, redirect_query, resolve_redirect_url};
use bridge_traits::browser::{PageLocation, RedirectChannel, UrlLauncher};
use bridge_traits::platform::Platform;
use core_async::sync::CancellationToken;
use core_runtime::config::AuthConfig;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Redirect path used when `auth.platform.web.redirect_url` is not configured.
pub const DEFAULT_WEB_REDIRECT: &str = "/auth/callback";

/// Static page relaying the redirect query over the broadcast channel.
pub const CALLBACK_ASSET_PATH: &str = "/oauth2_callback.html";

pub struct WebRedirectFlow {
    launcher: Arc<dyn UrlLauncher>,
    channel: Arc<dyn RedirectChannel>,
    location: Arc<dyn PageLocation>,
}

impl WebRedirectFlow {
    pub fn new(
        launcher: Arc<dyn UrlLauncher>,
        channel: Arc<dyn RedirectChannel>,
        location: Arc<dyn PageLocation>,
    ) -> Self {
        Self {
            launcher,
            channel,
            location,
        }
    }

    fn current_url(&self) -> Result<Url> {
        let raw = self
            .location
            .current_url()
            .map_err(|e| AuthError::Configuration(format!("Page location unavailable: {}", e)))?;
        Url::parse(&raw)
            .map_err(|e| AuthError::Configuration(format!("Invalid page location '{}': {}", raw, e)))
    }

    fn redirect_url(&self, config: &AuthConfig, base: &Url) -> Result<Url> {
        resolve_redirect_url(config.redirect_url(Platform::Web), base, DEFAULT_WEB_REDIRECT)
    }

    #[instrument(skip_all)]
    pub async fn run(
        &self,
        grant: &GrantClient,
        scopes: &[String],
        listener: Option<&dyn LoginListener>,
        cancel: &CancellationToken,
    ) -> Result<Option<ClientHandle>> {
        let base = self.current_url()?;
        let redirect_url = self.redirect_url(grant.config(), &base)?;
        let pending = grant.begin(&redirect_url, scopes)?;

        if let Some(listener) = listener {
            listener.on_authorization_url(pending.authorization_url());
        }

        let _subscription = ChannelGuard(self.channel.as_ref());

        if let Err(e) = self
            .launcher
            .open_url(pending.authorization_url().as_str())
            .await
        {
            warn!(error = %e, "Could not open the authorization page");
            return Ok(None);
        }

        let query = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Web login cancelled while waiting for the redirect");
                return Ok(None);
            }
            query = self.await_redirect(&redirect_url) => query?,
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Web login cancelled during code exchange");
                Ok(None)
            }
            handle = grant.complete(&pending, &query) => handle.map(Some),
        }
    }

    async fn await_redirect(&self, redirect_url: &Url) -> Result<String> {
        loop {
            let payload = self.channel.next_redirect().await.map_err(|e| {
                AuthError::InvalidRedirect(format!("Redirect channel failed: {}", e))
            })?;

            match redirect_query(redirect_url, &payload) {
                Some(query) => return Ok(query),
                None => debug!("Ignoring message for another page"),
            }
        }
    }

    /// Forward the redirect page to the callback asset, keeping its query.
    ///
    /// Returns immediately when the current page is not the redirect URL.
    /// Otherwise the page is being replaced and the returned future never
    /// completes.
    pub async fn login_init(&self, config: &AuthConfig) -> Result<()> {
        let current = self.current_url()?;
        let redirect_url = self.redirect_url(config, &current)?;

        if !matches_redirect(&redirect_url, &current) {
            return Ok(());
        }

        let mut target = current.join(CALLBACK_ASSET_PATH).map_err(|e| {
            AuthError::Configuration(format!("Invalid callback asset path: {}", e))
        })?;
        target.set_query(current.query());

        info!("Forwarding authorization response to the callback page");
        self.location
            .replace(target.as_str())
            .map_err(|e| AuthError::InvalidRedirect(format!("Could not leave redirect page: {}", e)))?;

        futures::future::pending::<Result<()>>().await
    }
}

/// Closes the channel subscription when the flow ends.
struct ChannelGuard<'a>(&'a dyn RedirectChannel);

impl Drop for ChannelGuard<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
