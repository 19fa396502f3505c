//! Shared fakes for the core-auth integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::storage::SecureStore;
use bridge_traits::time::Clock;
use bridge_traits::{PageLocation, RedirectChannel, UrlLauncher, WindowController};
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use core_auth::{AuthHooks, Claims};
use core_runtime::config::AuthConfig;
use mockall::mock;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use url::Url;

pub const AUTHORIZE: &str = "https://idp.example.com/authorize";
pub const TOKEN: &str = "https://idp.example.com/token";
pub const APP_PAGE: &str = "https://app.example.com/";

// ============================================================================
// Configuration
// ============================================================================

pub fn config_with_redirect(io_redirect: Option<&str>) -> Arc<AuthConfig> {
    let mut builder = AuthConfig::builder()
        .authorization_endpoint(AUTHORIZE)
        .token_endpoint(TOKEN)
        .client_id("test-client")
        .scopes(["openid"]);
    if let Some(redirect) = io_redirect {
        builder = builder.redirect_url(bridge_traits::Platform::Io, redirect);
    }
    Arc::new(builder.build().unwrap())
}

pub fn config() -> Arc<AuthConfig> {
    config_with_redirect(None)
}

pub fn jwt(claims: serde_json::Value) -> String {
    format!(
        "eyJhbGciOiJub25lIn0.{}.",
        URL_SAFE_NO_PAD.encode(claims.to_string())
    )
}

pub fn query_param(url: &Url, name: &str) -> String {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .unwrap_or_else(|| panic!("missing query parameter {name}"))
}

pub fn form_body(request: &HttpRequest) -> HashMap<String, String> {
    serde_urlencoded::from_bytes(request.body.as_deref().unwrap()).unwrap()
}

// ============================================================================
// Hooks
// ============================================================================

mock! {
    pub Hooks {}

    impl AuthHooks<String> for Hooks {
        fn create_user(&self, claims: &Claims) -> String;
        fn on_login(&self, user: &String);
        fn on_logout(&self, user: &String);
    }
}

// ============================================================================
// Secure storage
// ============================================================================

#[derive(Default)]
pub struct MemorySecureStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
    hold_next_write: AtomicBool,
    write_held: Notify,
    write_released: Notify,
}

impl MemorySecureStore {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    pub fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .map(|bytes| serde_json::from_slice(bytes).unwrap())
    }

    pub fn seed(&self, key: &str, value: serde_json::Value) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string().into_bytes());
    }

    /// Number of `set_secret` and `delete_secret` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Park the next `set_secret` until [`release_write`](Self::release_write).
    pub fn hold_next_write(&self) {
        self.hold_next_write.store(true, Ordering::SeqCst);
    }

    /// Wait until the held write has started.
    pub async fn write_started(&self) {
        self.write_held.notified().await;
    }

    pub fn release_write(&self) {
        self.write_released.notify_one();
    }
}

#[async_trait]
impl SecureStore for MemorySecureStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> BridgeResult<()> {
        if self.hold_next_write.swap(false, Ordering::SeqCst) {
            self.write_held.notify_one();
            self.write_released.notified().await;
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> BridgeResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Token endpoint
// ============================================================================

#[derive(Default)]
pub struct ScriptedHttpClient {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.responses.lock().unwrap().push_back(HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        });
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BridgeError::Network("connection refused".to_string()))
    }
}

// ============================================================================
// Clock
// ============================================================================

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(DateTime::from_timestamp(1_704_067_200, 0).unwrap()),
        })
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.now.lock().unwrap() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Browser
// ============================================================================

/// What the fake identity provider does once the authorization page opens.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Consent {
    /// Redirect back with a code and the request's state.
    Grant,
    /// Redirect back with `error=access_denied`.
    Deny,
    /// Never redirect; the user walked away.
    Ignore,
}

/// Launcher standing in for browser plus identity provider.
pub struct FakeBrowser {
    consent: Consent,
    redirects: mpsc::UnboundedSender<String>,
    opened: mpsc::UnboundedSender<Url>,
    launches: AtomicUsize,
}

impl FakeBrowser {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlLauncher for FakeBrowser {
    async fn open_url(&self, url: &str) -> BridgeResult<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let url = Url::parse(url).unwrap();
        let redirect = query_param(&url, "redirect_uri");
        let state = query_param(&url, "state");
        let _ = self.opened.send(url);

        match self.consent {
            Consent::Grant => {
                let _ = self
                    .redirects
                    .send(format!("{redirect}?code=auth-code&state={state}"));
            }
            Consent::Deny => {
                let _ = self.redirects.send(format!(
                    "{redirect}?error=access_denied&error_description=denied&state={state}"
                ));
            }
            Consent::Ignore => {}
        }
        Ok(())
    }
}

pub struct FakeChannel {
    redirects: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    pub closes: AtomicUsize,
}

#[async_trait]
impl RedirectChannel for FakeChannel {
    async fn next_redirect(&self) -> BridgeResult<String> {
        self.redirects
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BridgeError::OperationFailed("channel closed".to_string()))
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeLocation;

impl PageLocation for FakeLocation {
    fn current_url(&self) -> BridgeResult<String> {
        Ok(APP_PAGE.to_string())
    }

    fn replace(&self, _url: &str) -> BridgeResult<()> {
        Ok(())
    }
}

/// Browser, channel and page wired together, plus a receiver of opened URLs.
pub fn fake_web(
    consent: Consent,
) -> (
    Arc<FakeBrowser>,
    Arc<FakeChannel>,
    mpsc::UnboundedReceiver<Url>,
) {
    let (redirects_tx, redirects_rx) = mpsc::unbounded_channel();
    let (opened_tx, opened_rx) = mpsc::unbounded_channel();
    let browser = Arc::new(FakeBrowser {
        consent,
        redirects: redirects_tx,
        opened: opened_tx,
        launches: AtomicUsize::new(0),
    });
    let channel = Arc::new(FakeChannel {
        redirects: tokio::sync::Mutex::new(redirects_rx),
        closes: AtomicUsize::new(0),
    });
    (browser, channel, opened_rx)
}

#[derive(Default)]
pub struct CountingWindow {
    pub minimized: AtomicUsize,
    pub restored: AtomicUsize,
}

#[async_trait]
impl WindowController for CountingWindow {
    async fn minimize(&self) -> BridgeResult<()> {
        self.minimized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restore_and_focus(&self) -> BridgeResult<()> {
        self.restored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ManualClock {
    pub fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}
