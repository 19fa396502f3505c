//! # OAuth2 Provider
//!
//! Login state machine and credential lifecycle for one identity provider.
//!
//! ## States
//!
//! ```text
//!               login()                      success
//! NotLoggedIn ──────────▶ InLoginProcess ─────────────▶ LoggedIn
//!      ▲                       │ cancel / error / none        │
//!      └───────────────────────┴──────────────────────────────┘
//!                     logout(), failed refresh
//! ```
//!
//! The user value produced by [`AuthHooks::create_user`] exists exactly while
//! the provider is `LoggedIn`; it is set together with the client and cleared
//! together with it.
//!
//! ## Login
//!
//! Every [`OAuth2Provider::login`] first reads the credential store. Stored
//! credentials with a refresh token are renewed silently, stored credentials
//! without one are used as long as they have not expired, and otherwise the
//! interactive [`LoginFlowStrategy`] runs. A login started while another one
//! is in flight cancels and fully unwinds the earlier attempt first.
//!
//! ## Expiration
//!
//! A one-shot timer fires when the access token expires. Reading the state
//! also checks the expiration: an expired session reads as `NotLoggedIn`
//! immediately while a background task refreshes it, or logs out when it
//! cannot be refreshed.
//!
//! ## Notifications
//!
//! Listeners registered with [`OAuth2Provider::add_listener`] are invoked
//! after every state transition. Detailed [`AuthEvent`]s go to the
//! [`EventBus`].

use crate::controller::AuthHooks;
use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::oauth::{ClientHandle, GrantClient};
use crate::strategy::{LoginFlowStrategy, LoginListener, UnsupportedFlow};
use crate::types::{Credentials, LoginState};
use bridge_traits::http::HttpClient;
use bridge_traits::platform::{Platform, PlatformSendSync};
use bridge_traits::storage::SecureStore;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_async::sync::{CancellationToken, Mutex, RwLock};
use core_async::task::spawn_detached;
use core_async::time::{sleep, Duration};
use core_runtime::config::AuthConfig;
use core_runtime::events::{AuthEvent, EventBus, Receiver};
use core_runtime::notifier::{ListenerId, StateNotifier};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tracing::{debug, info, instrument, warn};

/// Session data guarded as one unit so state, client and user never drift
/// apart.
struct Session<U> {
    state: LoginState,
    client: Option<ClientHandle>,
    user: Option<Arc<U>>,
}

impl<U> Default for Session<U> {
    fn default() -> Self {
        Self {
            state: LoginState::NotLoggedIn,
            client: None,
            user: None,
        }
    }
}

type PendingSlot = std::sync::Mutex<Option<(u64, CancellationToken)>>;

struct Inner<U> {
    grant: GrantClient,
    scopes: Vec<String>,
    strategy: LoginFlowStrategy,
    store: CredentialStore,
    hooks: Arc<dyn AuthHooks<U>>,
    clock: Arc<dyn Clock>,
    notifier: Arc<StateNotifier>,
    events: EventBus,
    session: RwLock<Session<U>>,
    /// Serializes login attempts and expiration handling.
    login_gate: Mutex<()>,
    pending: PendingSlot,
    next_attempt: AtomicU64,
    expiry_timer: std::sync::Mutex<Option<CancellationToken>>,
    expiration_check_running: AtomicBool,
}

/// OAuth2 Authorization Code provider.
///
/// Cheap to clone; clones share the same state machine.
pub struct OAuth2Provider<U> {
    inner: Arc<Inner<U>>,
}

impl<U> Clone for OAuth2Provider<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`OAuth2Provider`].
pub struct OAuth2ProviderBuilder<U> {
    config: Arc<AuthConfig>,
    hooks: Arc<dyn AuthHooks<U>>,
    strategy: Option<LoginFlowStrategy>,
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<EventBus>,
    notifier: Option<Arc<StateNotifier>>,
    credentials_key: Option<String>,
}

impl<U> OAuth2ProviderBuilder<U> {
    pub fn strategy(mut self, strategy: impl Into<LoginFlowStrategy>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    pub fn http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn secure_store(mut self, secure_store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(secure_store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn notifier(mut self, notifier: Arc<StateNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Secure-storage key for the credentials. Defaults to
    /// [`CREDENTIALS_KEY`](crate::credential_store::CREDENTIALS_KEY).
    pub fn credentials_key(mut self, key: impl Into<String>) -> Self {
        self.credentials_key = Some(key.into());
        self
    }

    /// # Errors
    ///
    /// [`AuthError::Configuration`] when the HTTP client or the secure store
    /// is missing.
    pub fn build(self) -> Result<OAuth2Provider<U>> {
        let http_client = self.http_client.ok_or_else(|| {
            AuthError::Configuration("OAuth2 provider needs an HTTP client".to_string())
        })?;
        let secure_store = self.secure_store.ok_or_else(|| {
            AuthError::Configuration("OAuth2 provider needs a secure store".to_string())
        })?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let strategy = self
            .strategy
            .unwrap_or_else(|| UnsupportedFlow::new(Platform::current()).into());
        let store = match self.credentials_key {
            Some(key) => CredentialStore::with_key(secure_store, key),
            None => CredentialStore::new(secure_store),
        };

        debug!(strategy = strategy.name(), "Built OAuth2 provider");

        Ok(OAuth2Provider {
            inner: Arc::new(Inner {
                scopes: self.config.scopes().to_vec(),
                grant: GrantClient::new(self.config, http_client, clock.clone()),
                strategy,
                store,
                hooks: self.hooks,
                clock,
                notifier: self.notifier.unwrap_or_default(),
                events: self.events.unwrap_or_default(),
                session: RwLock::new(Session::default()),
                login_gate: Mutex::new(()),
                pending: std::sync::Mutex::new(None),
                next_attempt: AtomicU64::new(0),
                expiry_timer: std::sync::Mutex::new(None),
                expiration_check_running: AtomicBool::new(false),
            }),
        })
    }
}

/// Clears the pending slot when the attempt that registered it ends.
struct PendingAttempt<'a> {
    slot: &'a PendingSlot,
    id: u64,
    token: CancellationToken,
}

impl Drop for PendingAttempt<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|(id, _)| *id == self.id) {
            *slot = None;
        }
    }
}

impl<U> OAuth2Provider<U>
where
    U: PlatformSendSync + 'static,
{
    pub fn builder(config: Arc<AuthConfig>, hooks: Arc<dyn AuthHooks<U>>) -> OAuth2ProviderBuilder<U> {
        OAuth2ProviderBuilder {
            config,
            hooks,
            strategy: None,
            http_client: None,
            secure_store: None,
            clock: None,
            events: None,
            notifier: None,
            credentials_key: None,
        }
    }

    /// Scopes requested on every login and refresh.
    pub fn scopes(&self) -> &[String] {
        &self.inner.scopes
    }

    pub fn strategy(&self) -> &LoginFlowStrategy {
        &self.inner.strategy
    }

    pub fn config(&self) -> &AuthConfig {
        self.inner.grant.config()
    }

    /// Application start hook, see [`LoginFlowStrategy::login_init`].
    pub async fn login_init(&self) -> Result<()> {
        self.inner.strategy.login_init(&self.inner.grant).await
    }

    /// Log in, silently when stored credentials allow it.
    ///
    /// Returns `Ok(true)` once logged in and `Ok(false)` when the attempt was
    /// cancelled or produced no client.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Authentication`] when the authorization server rejects
    ///   the login; stored credentials are cleared
    /// - [`AuthError::Storage`] when the credential store fails
    /// - any other grant failure, with stored credentials left untouched
    #[instrument(skip(self, listener), fields(strategy = self.inner.strategy.name()))]
    pub async fn login(&self, listener: Option<&dyn LoginListener>) -> Result<bool> {
        if self.inner.session.read().await.state == LoginState::InLoginProcess {
            info!("Login already in progress, unwinding it first");
            self.logout().await?;
        }

        let _gate = self.inner.login_gate.lock().await;
        let attempt = self.begin_attempt();

        let previous = {
            let mut session = self.inner.session.write().await;
            if session.state == LoginState::LoggedIn {
                session.state = LoginState::NotLoggedIn;
                Some((session.client.take(), session.user.take()))
            } else {
                None
            }
        };
        if let Some((client, user)) = previous {
            debug!("Discarding current session before logging in again");
            self.cancel_expiry_timer();
            if let Some(client) = client {
                client.close();
            }
            self.finish_logged_out(user).await?;
        }

        let restored = self.inner.store.restore().await?;

        self.inner.session.write().await.state = LoginState::InLoginProcess;
        self.inner.notifier.notify_listeners();
        self.inner.events.emit(AuthEvent::LoginStarted).ok();

        let outcome = match self.attempt(restored, listener, &attempt.token).await {
            Ok(Some(client)) if attempt.token.is_cancelled() => {
                debug!("Login cancelled after the grant completed");
                client.close();
                Ok(None)
            }
            outcome => outcome,
        };

        match outcome {
            Ok(Some(client)) => self.finish_logged_in(client, &attempt.token).await,
            Ok(None) => {
                info!("Login ended without a client");
                self.inner.session.write().await.state = LoginState::NotLoggedIn;
                self.finish_logged_out(None).await?;
                Ok(false)
            }
            Err(err) => {
                self.inner.session.write().await.state = LoginState::NotLoggedIn;
                if let AuthError::Authentication { code, description } = &err {
                    warn!(error = %err, "Login rejected by the authorization server");
                    if let Err(store_err) = self.finish_logged_out(None).await {
                        warn!(error = %store_err, "Could not clear credentials after failed login");
                    }
                    self.inner
                        .events
                        .emit(AuthEvent::AuthFailed {
                            code: code.clone(),
                            description: description.clone(),
                        })
                        .ok();
                } else {
                    warn!(error = %err, "Login failed");
                    self.inner.notifier.notify_listeners();
                }
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        restored: Option<Credentials>,
        listener: Option<&dyn LoginListener>,
        cancel: &CancellationToken,
    ) -> Result<Option<ClientHandle>> {
        let inner = &self.inner;

        if let Some(credentials) = restored {
            if credentials.can_refresh() {
                info!("Refreshing stored credentials");
                return tokio::select! {
                    _ = cancel.cancelled() => Ok(None),
                    refreshed = inner.grant.refresh(&credentials, &inner.scopes) => refreshed.map(Some),
                };
            }

            if !credentials.is_expired(inner.clock.now()) {
                match ClientHandle::from_credentials(credentials) {
                    Ok(client) => {
                        info!("Using stored credentials");
                        return Ok(Some(client));
                    }
                    Err(e) => warn!(error = %e, "Stored ID token is unreadable"),
                }
            } else {
                info!("Stored credentials expired and cannot be refreshed");
            }
            inner.store.clear().await?;
        }

        inner
            .strategy
            .run(&inner.grant, &inner.scopes, listener, cancel)
            .await
    }

    /// Cancel the pending login, then end the session.
    ///
    /// Without a live client this only cancels: no callback runs and the
    /// credential store is not touched. Tokens are not revoked at the server.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        self.cancel_login();

        let (client, user) = {
            let mut session = self.inner.session.write().await;
            let Some(client) = session.client.take() else {
                return Ok(());
            };
            session.state = LoginState::NotLoggedIn;
            (client, session.user.take())
        };

        self.cancel_expiry_timer();
        client.close();
        info!("Logged out");
        self.finish_logged_out(user).await
    }

    /// Cancel the pending login attempt, if any.
    ///
    /// Returns `true` when there was one. The attempt resolves to
    /// `Ok(false)` and releases its resources.
    pub fn cancel_login(&self) -> bool {
        let pending = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pending {
            Some((_, token)) => {
                debug!("Cancelling pending login");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Current state.
    ///
    /// An expired session reads as `NotLoggedIn` and triggers a background
    /// refresh-or-logout.
    pub async fn state(&self) -> LoginState {
        let state = {
            let session = self.inner.session.read().await;
            if self.is_expired(&session) {
                None
            } else {
                Some(session.state)
            }
        };
        state.unwrap_or_else(|| {
            self.spawn_expiration_check();
            LoginState::NotLoggedIn
        })
    }

    /// The logged-in user, `None` unless [`state`](Self::state) is `LoggedIn`.
    pub async fn user(&self) -> Option<Arc<U>> {
        let user = {
            let session = self.inner.session.read().await;
            if self.is_expired(&session) {
                None
            } else {
                Some(session.user.clone())
            }
        };
        user.unwrap_or_else(|| {
            self.spawn_expiration_check();
            None
        })
    }

    /// Live access token for API calls.
    pub async fn access_token(&self) -> Option<String> {
        let token = {
            let session = self.inner.session.read().await;
            if self.is_expired(&session) {
                None
            } else {
                Some(
                    session
                        .client
                        .as_ref()
                        .map(|client| client.access_token().to_string()),
                )
            }
        };
        token.unwrap_or_else(|| {
            self.spawn_expiration_check();
            None
        })
    }

    /// `false` unless logged in.
    pub async fn is_resource_granted(&self, resource: &str) -> bool {
        let granted = self.state().await == LoginState::LoggedIn;
        debug!(resource, granted, "Resource grant check");
        granted
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.notifier.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.notifier.remove_listener(id)
    }

    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    fn is_expired(&self, session: &Session<U>) -> bool {
        session.state == LoginState::LoggedIn
            && session
                .client
                .as_ref()
                .is_some_and(|client| client.credentials().is_expired(self.inner.clock.now()))
    }

    fn begin_attempt(&self) -> PendingAttempt<'_> {
        let id = self.inner.next_attempt.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        *self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((id, token.clone()));
        PendingAttempt {
            slot: &self.inner.pending,
            id,
            token,
        }
    }

    /// Persist and install a fresh client. Resolves to `false` when the
    /// attempt was cancelled while the credentials were being written.
    async fn finish_logged_in(&self, client: ClientHandle, cancel: &CancellationToken) -> Result<bool> {
        let inner = &self.inner;
        let user = Arc::new(inner.hooks.create_user(client.claims()));

        if let Err(err) = inner.store.store(client.credentials()).await {
            warn!(error = %err, "Could not persist credentials, login abandoned");
            client.close();
            inner.session.write().await.state = LoginState::NotLoggedIn;
            inner.notifier.notify_listeners();
            return Err(err);
        }

        let expiration = client.credentials().expiration;
        let scopes = client.credentials().scopes.clone();
        {
            let mut session = inner.session.write().await;
            if cancel.is_cancelled() {
                session.state = LoginState::NotLoggedIn;
                drop(session);
                info!("Login cancelled while persisting credentials");
                client.close();
                self.finish_logged_out(None).await?;
                return Ok(false);
            }
            session.state = LoginState::LoggedIn;
            session.client = Some(client);
            session.user = Some(user.clone());
        }

        inner.hooks.on_login(&user);
        info!(scopes = ?scopes, "Logged in");
        inner.notifier.notify_listeners();
        inner.events.emit(AuthEvent::LoggedIn { scopes }).ok();
        self.schedule_expiration(expiration);
        Ok(true)
    }

    /// Side effects of entering `NotLoggedIn`. The session must already be
    /// cleared.
    async fn finish_logged_out(&self, user: Option<Arc<U>>) -> Result<()> {
        let inner = &self.inner;
        if let Some(user) = &user {
            inner.hooks.on_logout(user);
        }

        let cleared = inner.store.clear().await;
        inner.notifier.notify_listeners();
        if user.is_some() {
            inner.events.emit(AuthEvent::LoggedOut).ok();
        }
        cleared
    }

    fn cancel_expiry_timer(&self) {
        let timer = self
            .inner
            .expiry_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    fn schedule_expiration(&self, expiration: Option<DateTime<Utc>>) {
        let Some(expiration) = expiration else {
            return;
        };

        let token = CancellationToken::new();
        let previous = self
            .inner
            .expiry_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let delay = (expiration - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        debug!(delay_secs = delay.as_secs(), "Scheduled expiration check");

        let weak: Weak<Inner<U>> = Arc::downgrade(&self.inner);
        spawn_detached(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        OAuth2Provider { inner }.run_expiration_check().await;
                    }
                }
            }
        });
    }

    fn spawn_expiration_check(&self) {
        if self
            .inner
            .expiration_check_running
            .swap(true, Ordering::AcqRel)
        {
            return;
        }
        let provider = self.clone();
        spawn_detached(async move {
            provider.handle_expiration().await;
            provider
                .inner
                .expiration_check_running
                .store(false, Ordering::Release);
        });
    }

    async fn run_expiration_check(&self) {
        if self
            .inner
            .expiration_check_running
            .swap(true, Ordering::AcqRel)
        {
            return;
        }
        self.handle_expiration().await;
        self.inner
            .expiration_check_running
            .store(false, Ordering::Release);
    }

    /// Refresh an expired session, or log out when that is not possible.
    #[instrument(skip(self))]
    async fn handle_expiration(&self) {
        let inner = &self.inner;
        let _gate = inner.login_gate.lock().await;

        let credentials = {
            let session = inner.session.read().await;
            if session.state != LoginState::LoggedIn {
                return;
            }
            session.client.as_ref().map(|c| c.credentials().clone())
        };
        let Some(credentials) = credentials else {
            return;
        };

        if credentials.can_refresh() {
            let attempt = self.begin_attempt();
            let refreshed = tokio::select! {
                _ = attempt.token.cancelled() => None,
                refreshed = inner.grant.refresh(&credentials, &inner.scopes) => Some(refreshed),
            };
            drop(attempt);

            match refreshed {
                None => {
                    debug!("Refresh cancelled");
                    return;
                }
                Some(Ok(client)) => match self.replace_client(client).await {
                    Ok(()) => return,
                    Err(e) => warn!(error = %e, "Could not persist refreshed credentials"),
                },
                Some(Err(e)) => {
                    warn!(error = %e, "Silent refresh failed");
                    if let AuthError::Authentication { code, description } = &e {
                        inner
                            .events
                            .emit(AuthEvent::AuthFailed {
                                code: code.clone(),
                                description: description.clone(),
                            })
                            .ok();
                    }
                }
            }
        } else {
            info!("Session expired without a refresh token");
        }

        if let Err(e) = self.logout().await {
            warn!(error = %e, "Logout after expiration failed");
        }
    }

    async fn replace_client(&self, client: ClientHandle) -> Result<()> {
        let inner = &self.inner;
        let expiration = client.credentials().expiration;

        if inner.session.read().await.state != LoginState::LoggedIn {
            // Logged out while refreshing.
            client.close();
            return Ok(());
        }
        inner.store.store(client.credentials()).await?;

        let previous = {
            let mut session = inner.session.write().await;
            if session.state != LoginState::LoggedIn {
                // Logged out while persisting; drop what was just written.
                drop(session);
                client.close();
                return inner.store.clear().await;
            }
            session.client.replace(client)
        };
        if let Some(previous) = previous {
            previous.close();
        }

        info!("Session refreshed");
        inner.notifier.notify_listeners();
        inner
            .events
            .emit(AuthEvent::TokenRefreshed {
                expires_at_millis: expiration.map(|at| at.timestamp_millis()),
            })
            .ok();
        self.schedule_expiration(expiration);
        Ok(())
    }
}

impl<U> std::fmt::Debug for OAuth2Provider<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("strategy", &self.inner.strategy)
            .field("scopes", &self.inner.scopes)
            .finish()
    }
}
