//! Core authentication types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Decoded ID-token claims handed to the user factory.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Login state of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginState {
    NotLoggedIn,
    /// A login attempt (interactive or silent refresh) is running.
    InLoginProcess,
    LoggedIn,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::NotLoggedIn => "NotLoggedIn",
            LoginState::InLoginProcess => "InLoginProcess",
            LoginState::LoggedIn => "LoggedIn",
        };
        f.write_str(name)
    }
}

/// OAuth2 credentials as issued by the token endpoint.
///
/// Persisted as JSON by [`CredentialStore`](crate::credential_store::CredentialStore).
/// A value with an empty access token or no token endpoint is invalid; see
/// [`Credentials::is_valid`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<Url>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, token_endpoint: Url) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            id_token: None,
            token_endpoint: Some(token_endpoint),
            expiration: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Non-empty access token and a known token endpoint.
    pub fn is_valid(&self) -> bool {
        !self.access_token.trim().is_empty() && self.token_endpoint.is_some()
    }

    /// A refresh token and somewhere to send it.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
            && self.token_endpoint.is_some()
    }

    /// Credentials without an expiration never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "token_endpoint",
                &self.token_endpoint.as_ref().map(Url::as_str),
            )
            .field("expiration", &self.expiration)
            .field("scopes", &self.scopes)
            .finish()
    }
}
