//! Application hooks bound to a provider.
//!
//! The provider knows nothing about the application's user model. It builds
//! users through [`AuthHooks::create_user`] and reports lifecycle changes
//! through the remaining callbacks.

use crate::types::Claims;
use bridge_traits::platform::PlatformSendSync;
use std::fmt;

/// Callbacks connecting a provider to the application.
pub trait AuthHooks<U>: PlatformSendSync {
    /// Build the application user from ID-token claims. Called on every login.
    fn create_user(&self, claims: &Claims) -> U;

    fn on_login(&self, _user: &U) {}

    fn on_logout(&self, _user: &U) {}

    /// Application-level access check. Only consulted for logged-in sessions
    /// by the service layer; the default grants everything to any user.
    fn on_grant_resource(&self, user: Option<&U>, _resource: &str) -> bool {
        user.is_some()
    }
}

type CreateUser<U> = Box<dyn Fn(&Claims) -> U + Send + Sync>;
type UserCallback<U> = Box<dyn Fn(&U) + Send + Sync>;
type GrantCallback<U> = Box<dyn Fn(Option<&U>, &str) -> bool + Send + Sync>;

/// Closure-backed [`AuthHooks`].
///
/// ```
/// use core_auth::controller::{AuthController, AuthHooks};
///
/// let controller = AuthController::new(|claims| {
///     claims
///         .get("email")
///         .and_then(|v| v.as_str())
///         .unwrap_or_default()
///         .to_string()
/// })
/// .with_on_grant_resource(|user, resource| {
///     user.is_some_and(|email| email.ends_with("@example.com")) || resource == "public"
/// });
///
/// assert!(controller.on_grant_resource(None, "public"));
/// ```
pub struct AuthController<U> {
    create_user: CreateUser<U>,
    on_login: Option<UserCallback<U>>,
    on_logout: Option<UserCallback<U>>,
    on_grant_resource: Option<GrantCallback<U>>,
}

impl<U> AuthController<U> {
    pub fn new<F>(create_user: F) -> Self
    where
        F: Fn(&Claims) -> U + Send + Sync + 'static,
    {
        Self {
            create_user: Box::new(create_user),
            on_login: None,
            on_logout: None,
            on_grant_resource: None,
        }
    }

    pub fn with_on_login<F>(mut self, callback: F) -> Self
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        self.on_login = Some(Box::new(callback));
        self
    }

    pub fn with_on_logout<F>(mut self, callback: F) -> Self
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        self.on_logout = Some(Box::new(callback));
        self
    }

    pub fn with_on_grant_resource<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&U>, &str) -> bool + Send + Sync + 'static,
    {
        self.on_grant_resource = Some(Box::new(callback));
        self
    }
}

impl<U> AuthHooks<U> for AuthController<U> {
    fn create_user(&self, claims: &Claims) -> U {
        (self.create_user)(claims)
    }

    fn on_login(&self, user: &U) {
        if let Some(callback) = &self.on_login {
            callback(user);
        }
    }

    fn on_logout(&self, user: &U) {
        if let Some(callback) = &self.on_logout {
            callback(user);
        }
    }

    fn on_grant_resource(&self, user: Option<&U>, resource: &str) -> bool {
        match &self.on_grant_resource {
            Some(callback) => callback(user, resource),
            None => user.is_some(),
        }
    }
}

impl<U> fmt::Debug for AuthController<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthController")
            .field("on_login", &self.on_login.is_some())
            .field("on_logout", &self.on_logout.is_some())
            .field("on_grant_resource", &self.on_grant_resource.is_some())
            .finish()
    }
}
