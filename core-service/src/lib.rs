//! Authentication service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, secure
//! storage, browser launching, redirect delivery) and the application's
//! [`AuthHooks`] into an [`OAuth2Provider`]. Desktop apps typically enable the
//! `desktop-shims` feature (which depends on `bridge-desktop`), whereas
//! WebAssembly builds enable the `wasm` feature and rely on the adapters from
//! `bridge-wasm`.
//!
//! ```no_run
//! # #[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
//! # async fn example() -> core_service::Result<()> {
//! use core_auth::{AuthController, AuthHooks, Claims};
//! use core_service::{AuthDependencies, AuthService};
//! use std::sync::Arc;
//!
//! let settings = serde_json::json!({
//!     "auth": {
//!         "authorizationEndpoint": "https://idp.example.com/authorize",
//!         "tokenEndpoint": "https://idp.example.com/token",
//!         "clientId": "desktop-app",
//!         "platform": { "io": { "redirect_url": "http://127.0.0.1:8400/callback" } }
//!     }
//! });
//!
//! let hooks: Arc<dyn AuthHooks<Claims>> = Arc::new(AuthController::new(|claims| claims.clone()));
//! let service = AuthService::from_config_value(&settings, AuthDependencies::desktop()?, hooks)?;
//! service.login().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{
    browser::{PageLocation, RedirectChannel, UrlLauncher, WindowController},
    http::HttpClient,
    platform::{Platform, PlatformSendSync},
    storage::SecureStore,
    time::Clock,
};
use core_auth::{
    AuthHooks, LoginFlowStrategy, LoginListener, LoginState, OAuth2Provider, UnsupportedFlow,
    WebRedirectFlow,
};
use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, EventBus, Receiver};
use core_runtime::notifier::ListenerId;
use tracing::{debug, info};

pub use core_runtime::logging::{init_logging, LoggingConfig};

/// Bridge handles the authentication core requires.
///
/// The HTTP client and secure store are always needed. The browser-side
/// capabilities are needed by the login flow of the target platform only:
///
/// | Platform | Required |
/// |----------|----------|
/// | `Web` | `url_launcher`, `redirect_channel`, `page_location` |
/// | `Io` | `url_launcher`, `window_controller` |
/// | `Other` | nothing (login is unsupported) |
pub struct AuthDependencies {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub url_launcher: Option<Arc<dyn UrlLauncher>>,
    pub window_controller: Option<Arc<dyn WindowController>>,
    pub redirect_channel: Option<Arc<dyn RedirectChannel>>,
    pub page_location: Option<Arc<dyn PageLocation>>,
    pub clock: Option<Arc<dyn Clock>>,
    pub platform: Platform,
}

impl AuthDependencies {
    /// Construct a dependency bundle for the current platform.
    pub fn new(http_client: Arc<dyn HttpClient>, secure_store: Arc<dyn SecureStore>) -> Self {
        Self {
            http_client,
            secure_store,
            url_launcher: None,
            window_controller: None,
            redirect_channel: None,
            page_location: None,
            clock: None,
            platform: Platform::current(),
        }
    }

    pub fn with_url_launcher(mut self, launcher: Arc<dyn UrlLauncher>) -> Self {
        self.url_launcher = Some(launcher);
        self
    }

    pub fn with_window_controller(mut self, window: Arc<dyn WindowController>) -> Self {
        self.window_controller = Some(window);
        self
    }

    pub fn with_redirect_channel(mut self, channel: Arc<dyn RedirectChannel>) -> Self {
        self.redirect_channel = Some(channel);
        self
    }

    pub fn with_page_location(mut self, location: Arc<dyn PageLocation>) -> Self {
        self.page_location = Some(location);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override platform detection, e.g. to run the web flow in a test.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Desktop defaults: reqwest, OS keychain, system browser.
    #[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
    pub fn desktop() -> Result<Self> {
        use bridge_desktop::{
            KeyringSecureStore, NoopWindowController, ReqwestHttpClient, SystemBrowserLauncher,
        };

        Ok(Self::new(
            Arc::new(ReqwestHttpClient::try_new()?),
            Arc::new(KeyringSecureStore::new()),
        )
        .with_url_launcher(Arc::new(SystemBrowserLauncher))
        .with_window_controller(Arc::new(NoopWindowController))
        .with_platform(Platform::Io))
    }

    /// Browser defaults: fetch, encrypted localStorage under `namespace`,
    /// popup window and broadcast channel.
    #[cfg(all(feature = "wasm", target_arch = "wasm32"))]
    pub fn web(namespace: &str) -> Result<Self> {
        use bridge_wasm::{
            BroadcastRedirectChannel, PopupLauncher, WasmHttpClient, WasmSecureStore,
            WindowLocation,
        };

        Ok(Self::new(
            Arc::new(WasmHttpClient::new()?),
            Arc::new(WasmSecureStore::new(namespace)?),
        )
        .with_url_launcher(Arc::new(PopupLauncher::default()))
        .with_redirect_channel(Arc::new(BroadcastRedirectChannel::default()))
        .with_page_location(Arc::new(WindowLocation))
        .with_platform(Platform::Web))
    }

    fn login_strategy(&self) -> Result<LoginFlowStrategy> {
        match self.platform {
            Platform::Web => {
                let launcher = self.url_launcher.clone().ok_or_else(|| {
                    CoreError::missing("url_launcher", "web login needs a URL launcher")
                })?;
                let channel = self.redirect_channel.clone().ok_or_else(|| {
                    CoreError::missing("redirect_channel", "web login needs a redirect channel")
                })?;
                let location = self.page_location.clone().ok_or_else(|| {
                    CoreError::missing("page_location", "web login needs the page location")
                })?;
                Ok(WebRedirectFlow::new(launcher, channel, location).into())
            }
            #[cfg(not(target_arch = "wasm32"))]
            Platform::Io => {
                let launcher = self.url_launcher.clone().ok_or_else(|| {
                    CoreError::missing("url_launcher", "loopback login needs a URL launcher")
                })?;
                let window = self.window_controller.clone().ok_or_else(|| {
                    CoreError::missing(
                        "window_controller",
                        "loopback login needs a window controller",
                    )
                })?;
                Ok(core_auth::LoopbackFlow::new(launcher, window).into())
            }
            platform => Ok(UnsupportedFlow::new(platform).into()),
        }
    }
}

/// Primary façade exposed to host applications.
pub struct AuthService<U> {
    provider: OAuth2Provider<U>,
    hooks: Arc<dyn AuthHooks<U>>,
    events: EventBus,
}

impl<U> Clone for AuthService<U> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            hooks: Arc::clone(&self.hooks),
            events: self.events.clone(),
        }
    }
}

impl<U> AuthService<U>
where
    U: PlatformSendSync + 'static,
{
    /// Create the service, choosing the login flow from `deps.platform`.
    ///
    /// # Errors
    ///
    /// [`CoreError::CapabilityMissing`] when the platform's login flow lacks
    /// a bridge.
    pub fn new(
        config: AuthConfig,
        deps: AuthDependencies,
        hooks: Arc<dyn AuthHooks<U>>,
    ) -> Result<Self> {
        let strategy = deps.login_strategy()?;
        let events = EventBus::default();

        info!(
            platform = ?deps.platform,
            strategy = strategy.name(),
            client_id = config.client_id(),
            "Initializing auth service"
        );

        let mut builder = OAuth2Provider::builder(Arc::new(config), Arc::clone(&hooks))
            .strategy(strategy)
            .http_client(deps.http_client)
            .secure_store(deps.secure_store)
            .event_bus(events.clone());
        if let Some(clock) = deps.clock {
            builder = builder.clock(clock);
        }

        Ok(Self {
            provider: builder.build()?,
            hooks,
            events,
        })
    }

    /// Read the `auth.*` keys from an application configuration tree.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] when a required key is missing or invalid.
    pub fn from_config_value(
        settings: &serde_json::Value,
        deps: AuthDependencies,
        hooks: Arc<dyn AuthHooks<U>>,
    ) -> Result<Self> {
        let config = AuthConfig::from_value(settings)?;
        Self::new(config, deps, hooks)
    }

    pub fn provider(&self) -> &OAuth2Provider<U> {
        &self.provider
    }

    /// Run at application start, before rendering. On the web this never
    /// returns on the redirect page.
    pub async fn login_init(&self) -> Result<()> {
        Ok(self.provider.login_init().await?)
    }

    pub async fn login(&self) -> Result<bool> {
        Ok(self.provider.login(None).await?)
    }

    pub async fn login_with_listener(&self, listener: &dyn LoginListener) -> Result<bool> {
        Ok(self.provider.login(Some(listener)).await?)
    }

    pub async fn logout(&self) -> Result<()> {
        Ok(self.provider.logout().await?)
    }

    pub fn cancel_login(&self) -> bool {
        self.provider.cancel_login()
    }

    pub async fn state(&self) -> LoginState {
        self.provider.state().await
    }

    pub async fn user(&self) -> Option<Arc<U>> {
        self.provider.user().await
    }

    /// Logged in, and the application's grant callback agrees.
    pub async fn is_resource_granted(&self, resource: &str) -> bool {
        if !self.provider.is_resource_granted(resource).await {
            return false;
        }
        let user = self.provider.user().await;
        let granted = self.hooks.on_grant_resource(user.as_deref(), resource);
        debug!(resource, granted, "Application grant decision");
        granted
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.provider.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.provider.remove_listener(id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
