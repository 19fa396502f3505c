//! # Authentication Configuration
//!
//! Reads the `auth` section of the application's configuration tree and
//! validates it once, at startup.
//!
//! ## Recognised keys
//!
//! | Key | Required | Meaning |
//! |-----|----------|---------|
//! | `auth.authorizationEndpoint` | yes | Authorization endpoint URL |
//! | `auth.tokenEndpoint` | yes | Token endpoint URL |
//! | `auth.clientId` | yes | OAuth2 client identifier |
//! | `auth.clientSecret` | no | Secret for confidential clients |
//! | `auth.platform.web.redirect_url` | no | Redirect URL used in browsers |
//! | `auth.platform.io.redirect_url` | no | Redirect URL used by native hosts |
//! | `auth.scopes` | no | List (or space separated string) of scopes |
//!
//! Loading the tree from disk or from the page is the host's business; this
//! module only receives it as a `serde_json::Value`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::config::AuthConfig;
//! use serde_json::json;
//!
//! let config = AuthConfig::from_value(&json!({
//!     "auth": {
//!         "authorizationEndpoint": "https://idp.example.com/authorize",
//!         "tokenEndpoint": "https://idp.example.com/token",
//!         "clientId": "my-app",
//!         "scopes": ["openid", "profile"]
//!     }
//! }))
//! .unwrap();
//!
//! assert_eq!(config.scopes(), ["openid", "profile"]);
//! ```
//!
//! ## Error Handling
//!
//! Missing or blank required keys and unparsable endpoint URLs fail with
//! [`Error::Config`] naming the offending key. The application is expected to
//! stop rather than run without a working login.

use crate::error::{Error, Result};
use bridge_traits::platform::Platform;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use url::Url;

pub const KEY_AUTHORIZATION_ENDPOINT: &str = "auth.authorizationEndpoint";
pub const KEY_TOKEN_ENDPOINT: &str = "auth.tokenEndpoint";
pub const KEY_CLIENT_ID: &str = "auth.clientId";
pub const KEY_CLIENT_SECRET: &str = "auth.clientSecret";
pub const KEY_SCOPES: &str = "auth.scopes";

/// Scopes requested when `auth.scopes` is absent.
pub const DEFAULT_SCOPES: &[&str] = &["openid"];

/// Validated OAuth2 client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    authorization_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
    client_secret: Option<String>,
    redirect_urls: HashMap<Platform, String>,
    scopes: Vec<String>,
}

impl AuthConfig {
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Parse the `auth` section of a configuration tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required key is missing, blank, not a
    /// string, or not an absolute `http(s)` URL.
    pub fn from_value(root: &Value) -> Result<Self> {
        let mut builder = AuthConfig::builder();

        if let Some(value) = optional_string(root, KEY_AUTHORIZATION_ENDPOINT)? {
            builder = builder.authorization_endpoint(value);
        }
        if let Some(value) = optional_string(root, KEY_TOKEN_ENDPOINT)? {
            builder = builder.token_endpoint(value);
        }
        if let Some(value) = optional_string(root, KEY_CLIENT_ID)? {
            builder = builder.client_id(value);
        }
        if let Some(value) = optional_string(root, KEY_CLIENT_SECRET)? {
            builder = builder.client_secret(value);
        }

        for platform in [Platform::Web, Platform::Io] {
            let key = redirect_key(platform);
            if let Some(value) = optional_string(root, &key)? {
                builder = builder.redirect_url(platform, value);
            }
        }

        if let Some(scopes) = lookup(root, KEY_SCOPES) {
            builder = builder.scopes(parse_scopes(scopes)?);
        }

        builder.build()
    }

    pub fn authorization_endpoint(&self) -> &Url {
        &self.authorization_endpoint
    }

    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Configured redirect URL for `platform`, exactly as written (may be relative).
    pub fn redirect_url(&self, platform: Platform) -> Option<&str> {
        self.redirect_urls.get(&platform).map(String::as_str)
    }

    /// Ordered, de-duplicated scope list used for every login and refresh.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_urls", &self.redirect_urls)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Builder for [`AuthConfig`] applying the same validation as
/// [`AuthConfig::from_value`].
#[derive(Default)]
pub struct AuthConfigBuilder {
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_urls: HashMap<Platform, String>,
    scopes: Option<Vec<String>>,
}

impl AuthConfigBuilder {
    pub fn authorization_endpoint(mut self, url: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(url.into());
        self
    }

    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = Some(url.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn redirect_url(mut self, platform: Platform, url: impl Into<String>) -> Self {
        self.redirect_urls.insert(platform, url.into());
        self
    }

    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid or missing key.
    pub fn build(self) -> Result<AuthConfig> {
        let authorization_endpoint = required_url(
            KEY_AUTHORIZATION_ENDPOINT,
            self.authorization_endpoint.as_deref(),
        )?;
        let token_endpoint = required_url(KEY_TOKEN_ENDPOINT, self.token_endpoint.as_deref())?;

        let client_id = self
            .client_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| missing(KEY_CLIENT_ID))?;

        let client_secret = self.client_secret.filter(|s| !s.trim().is_empty());

        let redirect_urls = self
            .redirect_urls
            .into_iter()
            .map(|(platform, url)| (platform, url.trim().to_string()))
            .filter(|(_, url)| !url.is_empty())
            .collect();

        let mut scopes: Vec<String> = Vec::new();
        let requested = self
            .scopes
            .unwrap_or_else(|| DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect());
        for scope in requested {
            let scope = scope.trim();
            if !scope.is_empty() && !scopes.iter().any(|s| s == scope) {
                scopes.push(scope.to_string());
            }
        }

        Ok(AuthConfig {
            authorization_endpoint,
            token_endpoint,
            client_id,
            client_secret,
            redirect_urls,
            scopes,
        })
    }
}

fn redirect_key(platform: Platform) -> String {
    format!("auth.platform.{}.redirect_url", platform.config_key())
}

fn lookup<'a>(root: &'a Value, dotted_key: &str) -> Option<&'a Value> {
    dotted_key
        .split('.')
        .try_fold(root, |node, segment| node.get(segment))
        .filter(|value| !value.is_null())
}

fn optional_string(root: &Value, key: &str) -> Result<Option<String>> {
    match lookup(root, key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(Error::Config(format!(
            "{} must be a string, found {}",
            key,
            json_kind(other)
        ))),
    }
}

fn parse_scopes(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(s.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    Error::Config(format!(
                        "{} entries must be strings, found {}",
                        KEY_SCOPES,
                        json_kind(item)
                    ))
                })
            })
            .collect(),
        other => Err(Error::Config(format!(
            "{} must be a list of strings, found {}",
            KEY_SCOPES,
            json_kind(other)
        ))),
    }
}

fn required_url(key: &str, value: Option<&str>) -> Result<Url> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(key))?;

    let url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("{} is not a valid URL ({}): {}", key, e, raw)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "{} must use http or https, found scheme '{}'",
            key, other
        ))),
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{} is required but was not configured", key))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
