//! Integration tests for the OAuth2 provider state machine
//!
//! These tests drive the provider through the web redirect flow with fake
//! bridges:
//! - Interactive login, silent refresh and direct reuse of stored credentials
//! - Cancellation and re-entrant login
//! - Expiration handling (refresh or logout)
//! - Logout side effects and error classification

mod common;

use chrono::TimeDelta;
use common::*;
use core_auth::{AuthError, LoginState, OAuth2Provider, WebRedirectFlow, CREDENTIALS_KEY};
use core_runtime::events::AuthEvent;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    provider: OAuth2Provider<String>,
    store: Arc<MemorySecureStore>,
    http: Arc<ScriptedHttpClient>,
    browser: Arc<FakeBrowser>,
    channel: Arc<FakeChannel>,
    clock: Arc<ManualClock>,
    opened: mpsc::UnboundedReceiver<Url>,
}

fn fixture(consent: Consent, hooks: MockHooks) -> Fixture {
    let store = Arc::new(MemorySecureStore::default());
    let http = Arc::new(ScriptedHttpClient::default());
    let clock = ManualClock::new();
    let (browser, channel, opened) = fake_web(consent);

    let provider = OAuth2Provider::builder(config(), Arc::new(hooks))
        .strategy(WebRedirectFlow::new(
            browser.clone(),
            channel.clone(),
            Arc::new(FakeLocation),
        ))
        .http_client(http.clone())
        .secure_store(store.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    Fixture {
        provider,
        store,
        http,
        browser,
        channel,
        clock,
        opened,
    }
}

fn user_hooks(logins: usize, logouts: usize) -> MockHooks {
    let mut hooks = MockHooks::new();
    hooks
        .expect_create_user()
        .times(logins)
        .returning(|claims| {
            claims
                .get("email")
                .and_then(|v| v.as_str())
                .unwrap_or("anonymous")
                .to_string()
        });
    hooks.expect_on_login().times(logins).return_const(());
    hooks.expect_on_logout().times(logouts).return_const(());
    hooks
}

fn token_response(access_token: &str, refresh_token: Option<&str>, expires_in: i64) -> serde_json::Value {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": expires_in,
        "scope": "openid",
        "id_token": jwt(json!({"sub": "user-1", "email": "ada@example.com"})),
    });
    if let Some(refresh_token) = refresh_token {
        body["refresh_token"] = json!(refresh_token);
    }
    body
}

fn stored_credentials(refresh_token: Option<&str>, expiration_millis: Option<i64>) -> serde_json::Value {
    let mut value = json!({
        "accessToken": "stored-access",
        "tokenEndpoint": TOKEN,
        "scopes": ["openid"],
    });
    if let Some(refresh_token) = refresh_token {
        value["refreshToken"] = json!(refresh_token);
    }
    if let Some(expiration) = expiration_millis {
        value["expiration"] = json!(expiration);
    }
    value
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn login_without_stored_credentials_runs_the_flow() {
    let mut hooks = MockHooks::new();
    hooks
        .expect_create_user()
        .times(1)
        .returning(|claims| claims["email"].as_str().unwrap().to_string());
    hooks
        .expect_on_login()
        .times(1)
        .withf(|user| user == "ada@example.com")
        .return_const(());
    hooks.expect_on_logout().never();

    let f = fixture(Consent::Grant, hooks);
    f.http
        .push_json(200, token_response("at-1", Some("rt-1"), 3600));

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    f.provider.add_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut events = f.provider.subscribe();

    assert!(!f.provider.is_resource_granted("documents").await);
    assert_eq!(f.provider.login(None).await, Ok(true));

    assert_eq!(f.provider.state().await, LoginState::LoggedIn);
    assert_eq!(
        f.provider.user().await.as_deref().map(String::as_str),
        Some("ada@example.com")
    );
    assert_eq!(f.provider.access_token().await.as_deref(), Some("at-1"));
    assert!(f.provider.is_resource_granted("documents").await);
    assert_eq!(f.browser.launches(), 1);
    assert_eq!(f.channel.closes.load(Ordering::SeqCst), 1);
    assert!(notifications.load(Ordering::SeqCst) >= 2);

    let stored = f.store.get_json(CREDENTIALS_KEY).unwrap();
    assert_eq!(stored["accessToken"], "at-1");
    assert_eq!(stored["refreshToken"], "rt-1");
    assert_eq!(stored["scopes"], json!(["openid"]));

    let exchange = form_body(&f.http.requests()[0]);
    assert_eq!(exchange["grant_type"], "authorization_code");
    assert_eq!(exchange["code"], "auth-code");

    assert_eq!(events.try_recv().unwrap(), AuthEvent::LoginStarted);
    assert_eq!(
        events.try_recv().unwrap(),
        AuthEvent::LoggedIn {
            scopes: vec!["openid".to_string()]
        }
    );
}

#[tokio::test]
async fn stored_credentials_are_refreshed_without_the_flow() {
    let f = fixture(Consent::Grant, user_hooks(1, 0));
    f.store
        .seed(CREDENTIALS_KEY, stored_credentials(Some("rt-stored"), None));
    f.http.push_json(200, json!({"access_token": "at-2", "expires_in": 3600}));

    assert_eq!(f.provider.login(None).await, Ok(true));

    assert_eq!(f.browser.launches(), 0);
    assert_eq!(f.provider.access_token().await.as_deref(), Some("at-2"));

    let refresh = form_body(&f.http.requests()[0]);
    assert_eq!(refresh["grant_type"], "refresh_token");
    assert_eq!(refresh["refresh_token"], "rt-stored");
    assert_eq!(refresh["scope"], "openid");

    let stored = f.store.get_json(CREDENTIALS_KEY).unwrap();
    assert_eq!(stored["accessToken"], "at-2");
    assert_eq!(stored["refreshToken"], "rt-stored");
}

#[tokio::test]
async fn unexpired_credentials_without_refresh_token_are_reused() {
    let mut hooks = MockHooks::new();
    hooks
        .expect_create_user()
        .times(1)
        .returning(|claims| {
            assert!(claims.is_empty());
            "restored".to_string()
        });
    hooks.expect_on_login().times(1).return_const(());

    let f = fixture(Consent::Grant, hooks);
    let in_an_hour = f.clock.now_millis() + 3_600_000;
    f.store
        .seed(CREDENTIALS_KEY, stored_credentials(None, Some(in_an_hour)));

    assert_eq!(f.provider.login(None).await, Ok(true));
    assert_eq!(f.browser.launches(), 0);
    assert!(f.http.requests().is_empty());
    assert_eq!(
        f.provider.access_token().await.as_deref(),
        Some("stored-access")
    );
}

#[tokio::test]
async fn expired_unrefreshable_credentials_fall_back_to_the_flow() {
    let f = fixture(Consent::Grant, user_hooks(1, 0));
    let an_hour_ago = f.clock.now_millis() - 3_600_000;
    f.store
        .seed(CREDENTIALS_KEY, stored_credentials(None, Some(an_hour_ago)));
    f.http
        .push_json(200, token_response("fresh", Some("rt"), 3600));

    assert_eq!(f.provider.login(None).await, Ok(true));
    assert_eq!(f.browser.launches(), 1);
    assert_eq!(f.provider.access_token().await.as_deref(), Some("fresh"));
}

#[tokio::test]
async fn invalid_stored_credentials_are_discarded() {
    let f = fixture(Consent::Grant, user_hooks(1, 0));
    f.store.seed(
        CREDENTIALS_KEY,
        json!({"accessToken": "", "tokenEndpoint": TOKEN, "refreshToken": "rt"}),
    );
    f.http
        .push_json(200, token_response("fresh", None, 3600));

    assert_eq!(f.provider.login(None).await, Ok(true));
    assert_eq!(f.browser.launches(), 1);
    assert_eq!(
        form_body(&f.http.requests()[0])["grant_type"],
        "authorization_code"
    );
}

#[tokio::test]
async fn login_while_logged_in_replaces_the_session() {
    let f = fixture(Consent::Grant, user_hooks(2, 1));
    f.http
        .push_json(200, token_response("first", Some("rt-1"), 3600));
    f.http
        .push_json(200, token_response("second", Some("rt-2"), 3600));

    assert_eq!(f.provider.login(None).await, Ok(true));
    assert_eq!(f.provider.login(None).await, Ok(true));

    // The first session's credentials were cleared, so the second login
    // ran the interactive flow again instead of refreshing.
    assert_eq!(f.browser.launches(), 2);
    assert_eq!(f.provider.access_token().await.as_deref(), Some("second"));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancelled_login_returns_false_without_callbacks() {
    let mut f = fixture(Consent::Ignore, MockHooks::new());

    let provider = f.provider.clone();
    let login = tokio::spawn(async move { provider.login(None).await });

    f.opened.recv().await.unwrap();
    assert_eq!(f.provider.state().await, LoginState::InLoginProcess);
    assert!(f.provider.cancel_login());

    assert_eq!(login.await.unwrap(), Ok(false));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert!(f.provider.user().await.is_none());
    assert_eq!(f.channel.closes.load(Ordering::SeqCst), 1);
    assert!(!f.provider.cancel_login());
}

#[tokio::test]
async fn second_login_unwinds_the_first() {
    let mut f = fixture(Consent::Ignore, MockHooks::new());

    let first = {
        let provider = f.provider.clone();
        tokio::spawn(async move { provider.login(None).await })
    };
    f.opened.recv().await.unwrap();

    let second = {
        let provider = f.provider.clone();
        tokio::spawn(async move { provider.login(None).await })
    };

    assert_eq!(first.await.unwrap(), Ok(false));
    f.opened.recv().await.unwrap();
    assert_eq!(f.provider.state().await, LoginState::InLoginProcess);

    f.provider.logout().await.unwrap();
    assert_eq!(second.await.unwrap(), Ok(false));
    assert_eq!(f.browser.launches(), 2);
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
}

#[tokio::test]
async fn logout_while_credentials_are_persisted_cancels_the_login() {
    let mut hooks = MockHooks::new();
    hooks
        .expect_create_user()
        .times(1)
        .return_const("ada@example.com".to_string());
    hooks.expect_on_login().never();
    hooks.expect_on_logout().never();

    let f = fixture(Consent::Grant, hooks);
    f.http
        .push_json(200, token_response("at", Some("rt"), 3600));
    f.store.hold_next_write();

    let login = {
        let provider = f.provider.clone();
        tokio::spawn(async move { provider.login(None).await })
    };
    f.store.write_started().await;
    f.provider.logout().await.unwrap();
    f.store.release_write();

    assert_eq!(login.await.unwrap(), Ok(false));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert!(f.provider.user().await.is_none());
    assert!(f.provider.access_token().await.is_none());
    assert!(!f.store.contains(CREDENTIALS_KEY));
}

// ============================================================================
// Expiration
// ============================================================================

#[tokio::test]
async fn expired_session_with_rejected_refresh_logs_out() {
    let f = fixture(Consent::Grant, user_hooks(1, 1));
    f.http
        .push_json(200, token_response("at", Some("rt"), 60));
    f.http.push_json(
        400,
        json!({"error": "invalid_grant", "error_description": "refresh token revoked"}),
    );
    let mut events = f.provider.subscribe();

    assert_eq!(f.provider.login(None).await, Ok(true));
    f.clock.advance(TimeDelta::seconds(60) + TimeDelta::milliseconds(1));

    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);

    let store = f.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { !store.contains(CREDENTIALS_KEY) }
    })
    .await;

    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert!(f.provider.user().await.is_none());
    assert!(f.provider.access_token().await.is_none());

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&AuthEvent::AuthFailed {
        code: "invalid_grant".to_string(),
        description: Some("refresh token revoked".to_string()),
    }));
    assert_eq!(seen.last(), Some(&AuthEvent::LoggedOut));
}

#[tokio::test]
async fn expired_session_without_refresh_token_logs_out() {
    let f = fixture(Consent::Grant, user_hooks(1, 1));
    f.http.push_json(200, token_response("at", None, 60));

    assert_eq!(f.provider.login(None).await, Ok(true));
    f.clock.advance(TimeDelta::seconds(61));

    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    let store = f.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { !store.contains(CREDENTIALS_KEY) }
    })
    .await;
    assert_eq!(f.http.requests().len(), 1);
}

#[tokio::test]
async fn expired_session_is_refreshed_in_the_background() {
    let f = fixture(Consent::Grant, user_hooks(1, 0));
    f.http
        .push_json(200, token_response("at-1", Some("rt"), 60));
    f.http
        .push_json(200, json!({"access_token": "at-2", "expires_in": 3600}));

    assert_eq!(f.provider.login(None).await, Ok(true));
    f.clock.advance(TimeDelta::seconds(120));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);

    let provider = f.provider.clone();
    eventually(|| {
        let provider = provider.clone();
        async move { provider.state().await == LoginState::LoggedIn }
    })
    .await;

    assert_eq!(f.provider.access_token().await.as_deref(), Some("at-2"));
    assert_eq!(
        f.provider.user().await.as_deref().map(String::as_str),
        Some("ada@example.com")
    );
    assert_eq!(
        f.store.get_json(CREDENTIALS_KEY).unwrap()["accessToken"],
        "at-2"
    );
}

#[tokio::test]
async fn expiry_timer_logs_out_without_a_state_read() {
    let f = fixture(Consent::Grant, user_hooks(1, 1));
    f.http.push_json(200, token_response("at", None, 0));
    let mut events = f.provider.subscribe();

    assert_eq!(f.provider.login(None).await, Ok(true));

    let logged_out = tokio::time::timeout(Duration::from_secs(2), async {
        while events.recv().await.unwrap() != AuthEvent::LoggedOut {}
    })
    .await;
    assert!(logged_out.is_ok(), "expiry timer never logged out");

    assert!(!f.store.contains(CREDENTIALS_KEY));
    assert!(f.provider.user().await.is_none());
    assert_eq!(f.http.requests().len(), 1);
}

#[tokio::test]
async fn state_reads_do_not_wait_for_refreshed_credentials_to_persist() {
    let f = fixture(Consent::Grant, user_hooks(1, 0));
    f.http
        .push_json(200, token_response("at-1", Some("rt"), 60));
    f.http
        .push_json(200, json!({"access_token": "at-2", "expires_in": 3600}));

    assert_eq!(f.provider.login(None).await, Ok(true));
    f.store.hold_next_write();
    f.clock.advance(TimeDelta::seconds(120));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    f.store.write_started().await;

    let state = tokio::time::timeout(Duration::from_millis(500), f.provider.state())
        .await
        .expect("state() blocked on storage");
    assert_eq!(state, LoginState::NotLoggedIn);
    let token = tokio::time::timeout(Duration::from_millis(500), f.provider.access_token())
        .await
        .expect("access_token() blocked on storage");
    assert!(token.is_none());

    f.store.release_write();
    let provider = f.provider.clone();
    eventually(|| {
        let provider = provider.clone();
        async move { provider.state().await == LoginState::LoggedIn }
    })
    .await;
    assert_eq!(f.provider.access_token().await.as_deref(), Some("at-2"));
}

// ============================================================================
// Logout and errors
// ============================================================================

#[tokio::test]
async fn logout_when_not_logged_in_does_nothing() {
    let f = fixture(Consent::Grant, MockHooks::new());

    f.provider.logout().await.unwrap();

    assert_eq!(f.store.writes(), 0);
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
}

#[tokio::test]
async fn logout_clears_user_and_credentials() {
    let f = fixture(Consent::Grant, user_hooks(1, 1));
    f.http
        .push_json(200, token_response("at", Some("rt"), 3600));
    assert_eq!(f.provider.login(None).await, Ok(true));

    f.provider.logout().await.unwrap();

    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert!(f.provider.user().await.is_none());
    assert!(!f.store.contains(CREDENTIALS_KEY));
    assert!(!f.provider.is_resource_granted("documents").await);
}

#[tokio::test]
async fn denied_consent_is_an_authentication_error() {
    let f = fixture(Consent::Deny, MockHooks::new());
    let mut events = f.provider.subscribe();

    let result = f.provider.login(None).await;

    assert_eq!(
        result,
        Err(AuthError::authentication(
            "access_denied",
            Some("denied".to_string())
        ))
    );
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert!(f.http.requests().is_empty());

    assert_eq!(events.try_recv().unwrap(), AuthEvent::LoginStarted);
    assert!(matches!(
        events.try_recv().unwrap(),
        AuthEvent::AuthFailed { code, .. } if code == "access_denied"
    ));
}

#[tokio::test]
async fn rejected_refresh_on_login_clears_credentials() {
    let f = fixture(Consent::Grant, MockHooks::new());
    f.store
        .seed(CREDENTIALS_KEY, stored_credentials(Some("revoked"), None));
    f.http.push_json(400, json!({"error": "invalid_grant"}));

    let result = f.provider.login(None).await;

    assert!(matches!(result, Err(AuthError::Authentication { .. })));
    assert!(!f.store.contains(CREDENTIALS_KEY));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
}

#[tokio::test]
async fn network_failure_keeps_stored_credentials() {
    let f = fixture(Consent::Grant, MockHooks::new());
    f.store
        .seed(CREDENTIALS_KEY, stored_credentials(Some("rt"), None));

    let result = f.provider.login(None).await;

    assert!(matches!(result, Err(AuthError::Network(_))));
    assert!(f.store.contains(CREDENTIALS_KEY));
    assert_eq!(f.provider.state().await, LoginState::NotLoggedIn);
    assert_eq!(f.browser.launches(), 0);
}
