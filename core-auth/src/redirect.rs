//! Redirect URL handling.
//!
//! A redirect satisfies a pending login only when scheme, host, port,
//! user-info and path all equal the registered redirect URL. The query
//! (`code`, `state` or `error`) is the payload; the fragment is ignored.

use crate::error::{AuthError, Result};
use serde::Deserialize;
use url::Url;

/// Resolve the redirect URL for a flow.
///
/// `configured` wins over `default`; either may be relative and is resolved
/// against `base`.
pub fn resolve_redirect_url(configured: Option<&str>, base: &Url, default: &str) -> Result<Url> {
    let raw = configured
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default);

    base.join(raw)
        .map_err(|e| AuthError::Configuration(format!("Invalid redirect URL '{}': {}", raw, e)))
}

/// Exact comparison of everything but query and fragment.
pub fn matches_redirect(expected: &Url, candidate: &Url) -> bool {
    expected.scheme() == candidate.scheme()
        && expected.host_str() == candidate.host_str()
        && expected.port_or_known_default() == candidate.port_or_known_default()
        && expected.username() == candidate.username()
        && expected.password() == candidate.password()
        && expected.path() == candidate.path()
}

/// Query string of a redirect payload aimed at `expected`.
///
/// The payload is either a full URL, which must match `expected`, or a bare
/// query string. `None` means the payload belongs to some other page.
pub fn redirect_query(expected: &Url, payload: &str) -> Option<String> {
    let payload = payload.trim();
    match Url::parse(payload) {
        Ok(url) if matches_redirect(expected, &url) => Some(url.query().unwrap_or("").to_string()),
        Ok(_) => None,
        Err(_) => Some(payload.trim_start_matches('?').to_string()),
    }
}

/// Parameters of an authorization response (RFC 6749 section 4.1.2).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizationResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl AuthorizationResponse {
    pub fn from_query(query: &str) -> Result<Self> {
        serde_urlencoded::from_str(query.trim_start_matches('?'))
            .map_err(|e| AuthError::InvalidRedirect(format!("Malformed redirect query: {}", e)))
    }
}
