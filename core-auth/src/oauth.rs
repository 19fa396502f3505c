//! Authorization Code grant with PKCE (RFC 6749, RFC 7636)
//!
//! [`GrantClient`] talks to the two endpoints of the identity provider:
//!
//! - [`GrantClient::begin`] builds the authorization URL with a fresh PKCE
//!   challenge and `state`
//! - [`GrantClient::complete`] validates the redirect query and exchanges the
//!   code at the token endpoint
//! - [`GrantClient::refresh`] renews credentials with a refresh token
//!
//! Successful exchanges yield a [`ClientHandle`], the live credentials plus
//! the decoded ID-token claims.
//!
//! Tokens, codes and verifiers are never logged.

use crate::error::{AuthError, Result};
use crate::redirect::AuthorizationResponse;
use crate::types::{Claims, Credentials};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::TimeDelta;
use core_runtime::config::AuthConfig;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Upper bound for one token endpoint round trip.
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// PKCE code verifier and the matching `state` value.
///
/// The verifier stays on this side; only [`PkceVerifier::challenge`] is sent
/// with the authorization request.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// 32 random bytes for the verifier (43 characters once encoded), 16 for
    /// the state. Both URL-safe base64 without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256: `BASE64URL(SHA256(code_verifier))`
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// An authorization request waiting for its redirect.
#[derive(Debug, Clone)]
pub struct PendingGrant {
    authorization_url: Url,
    redirect_url: Url,
    scopes: Vec<String>,
    verifier: PkceVerifier,
}

impl PendingGrant {
    /// URL the user has to visit.
    pub fn authorization_url(&self) -> &Url {
        &self.authorization_url
    }

    pub fn redirect_url(&self) -> &Url {
        &self.redirect_url
    }

    pub fn state(&self) -> &str {
        self.verifier.state()
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Authenticated client: current credentials and the claims of their ID token.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientHandle {
    credentials: Credentials,
    claims: Claims,
}

impl ClientHandle {
    /// Wrap credentials, decoding the ID token when there is one.
    ///
    /// # Errors
    ///
    /// [`AuthError::Serialization`] when the ID token is not a JWT with a JSON
    /// object payload.
    pub fn from_credentials(credentials: Credentials) -> Result<Self> {
        let claims = match credentials.id_token.as_deref() {
            Some(id_token) => decode_claims(id_token)?,
            None => Claims::new(),
        };
        Ok(Self {
            credentials,
            claims,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn access_token(&self) -> &str {
        &self.credentials.access_token
    }

    pub fn into_credentials(self) -> Credentials {
        self.credentials
    }

    /// Release the client. Tokens are not revoked at the server.
    pub fn close(self) {
        debug!("Closed OAuth2 client");
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// The token comes straight from the token endpoint over TLS.
pub fn decode_claims(id_token: &str) -> Result<Claims> {
    let payload = id_token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::Serialization("ID token is not a JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::Serialization(format!("Invalid ID token encoding: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Serialization(format!("Invalid ID token payload: {}", e)))
}

/// Client for the authorization and token endpoints.
pub struct GrantClient {
    config: Arc<AuthConfig>,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl GrantClient {
    pub fn new(
        config: Arc<AuthConfig>,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            http_client,
            clock,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the authorization URL for `redirect_url` and `scopes`.
    #[instrument(skip(self, scopes), fields(redirect_url = %redirect_url))]
    pub fn begin(&self, redirect_url: &Url, scopes: &[String]) -> Result<PendingGrant> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut authorization_url = self.config.authorization_endpoint().clone();
        {
            let mut query = authorization_url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", self.config.client_id());
            query.append_pair("redirect_uri", redirect_url.as_str());
            if !scopes.is_empty() {
                query.append_pair("scope", &scopes.join(" "));
            }
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
        }

        debug!("Built authorization URL");

        Ok(PendingGrant {
            authorization_url,
            redirect_url: redirect_url.clone(),
            scopes: scopes.to_vec(),
            verifier,
        })
    }

    /// Finish a pending grant from the query string of its redirect.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Authentication`] when the redirect carries `error`
    /// - [`AuthError::StateMismatch`] when `state` differs from the request
    /// - [`AuthError::InvalidRedirect`] when there is no `code`
    /// - token endpoint failures, see [`GrantClient::refresh`]
    #[instrument(skip(self, pending, query))]
    pub async fn complete(&self, pending: &PendingGrant, query: &str) -> Result<ClientHandle> {
        let response = AuthorizationResponse::from_query(query)?;

        if let Some(code) = response.error {
            warn!(error = %code, "Authorization server returned an error");
            return Err(AuthError::Authentication {
                code,
                description: response.error_description,
            });
        }

        if response.state.as_deref() != Some(pending.state()) {
            warn!("Authorization response state does not match the request");
            return Err(AuthError::StateMismatch);
        }

        let code = response
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                AuthError::InvalidRedirect("Authorization response has no code".to_string())
            })?;

        self.exchange_code(pending, &code).await
    }

    /// Exchange an authorization code for credentials.
    #[instrument(skip(self, pending, code))]
    pub async fn exchange_code(&self, pending: &PendingGrant, code: &str) -> Result<ClientHandle> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", pending.redirect_url.as_str()),
            ("client_id", self.config.client_id()),
            ("code_verifier", pending.verifier.verifier()),
        ];
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }

        debug!("Exchanging authorization code");
        let token_endpoint = self.config.token_endpoint().clone();
        let tokens = self.request_tokens(&token_endpoint, &params).await?;

        let credentials =
            tokens.into_credentials(token_endpoint, None, &pending.scopes, self.clock.now());
        let handle = ClientHandle::from_credentials(credentials)?;
        info!(scopes = ?handle.credentials().scopes, "Authorization code exchanged");
        Ok(handle)
    }

    /// Renew `credentials` using their refresh token and token endpoint.
    ///
    /// A response without a new refresh token or ID token keeps the old ones.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when the credentials cannot be refreshed
    /// - [`AuthError::Authentication`] when the server rejects the grant
    /// - [`AuthError::Network`] on transport failures and 5xx responses
    /// - [`AuthError::Serialization`] on an unreadable success body
    #[instrument(skip(self, credentials, scopes))]
    pub async fn refresh(&self, credentials: &Credentials, scopes: &[String]) -> Result<ClientHandle> {
        let (Some(refresh_token), Some(token_endpoint)) = (
            credentials.refresh_token.as_deref().filter(|t| !t.is_empty()),
            credentials.token_endpoint.clone(),
        ) else {
            return Err(AuthError::NotAuthenticated);
        };

        let joined_scopes = scopes.join(" ");
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id()),
        ];
        if !scopes.is_empty() {
            params.push(("scope", joined_scopes.as_str()));
        }
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }

        debug!("Refreshing access token");
        let tokens = self.request_tokens(&token_endpoint, &params).await?;

        let handle = ClientHandle::from_credentials(tokens.into_credentials(
            token_endpoint,
            Some(credentials),
            scopes,
            self.clock.now(),
        ))?;
        info!(expires_at = ?handle.credentials().expiration, "Access token refreshed");
        Ok(handle)
    }

    async fn request_tokens(
        &self,
        token_endpoint: &Url,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let body = serde_urlencoded::to_string(params).map_err(|e| {
            AuthError::Serialization(format!("Failed to encode token request: {}", e))
        })?;

        let request = HttpRequest::new(HttpMethod::Post, token_endpoint.as_str())
            .header("Accept", "application/json")
            .form_body(body)
            .timeout(TOKEN_REQUEST_TIMEOUT);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if !response.is_success() {
            return Err(token_error(&response));
        }

        response.json().map_err(|e| {
            AuthError::Serialization(format!("Failed to parse token response: {}", e))
        })
    }
}

/// Success body of the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credentials(
        self,
        token_endpoint: Url,
        previous: Option<&Credentials>,
        requested_scopes: &[String],
        now: chrono::DateTime<chrono::Utc>,
    ) -> Credentials {
        let scopes = match self.scope.as_deref() {
            Some(granted) if !granted.trim().is_empty() => {
                granted.split_whitespace().map(str::to_string).collect()
            }
            _ => requested_scopes.to_vec(),
        };

        Credentials {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            id_token: self
                .id_token
                .or_else(|| previous.and_then(|p| p.id_token.clone())),
            token_endpoint: Some(token_endpoint),
            expiration: self
                .expires_in
                .and_then(TimeDelta::try_seconds)
                .map(|lifetime| now + lifetime),
            scopes,
        }
    }
}

/// Error body of the token endpoint (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn token_error(response: &HttpResponse) -> AuthError {
    let status = response.status;

    if response.is_server_error() {
        warn!(status, "Token endpoint unavailable");
        return AuthError::Network(format!("Token endpoint returned {}", status));
    }

    match response.json::<TokenErrorResponse>() {
        Ok(body) => {
            warn!(status, error = %body.error, "Token endpoint rejected the grant");
            AuthError::Authentication {
                code: body.error,
                description: body.error_description,
            }
        }
        Err(_) => {
            let text = response.text().ok().filter(|text| !text.trim().is_empty());
            warn!(status, "Token endpoint returned an unexpected error body");
            AuthError::Authentication {
                code: format!("http_{}", status),
                description: text,
            }
        }
    }
}
