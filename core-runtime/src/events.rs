//! # Event Bus System
//!
//! Broadcast channel for authentication events, built on
//! `tokio::sync::broadcast`. Where [`StateNotifier`](crate::notifier::StateNotifier)
//! only says "something changed", the bus carries what changed, for
//! subscribers that want details (analytics, session banners, logging).
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(AuthEvent::LoginStarted).ok();
//! assert_eq!(subscriber.recv().await.unwrap(), AuthEvent::LoginStarted);
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events and may continue.
//! - **`RecvError::Closed`**: every sender is gone, treat as shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Authentication lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum AuthEvent {
    /// A login attempt entered the interactive or refresh phase.
    LoginStarted,
    /// Login completed; carries the granted scopes.
    LoggedIn { scopes: Vec<String> },
    /// The session ended (user logout, cancelled attempt, failed refresh).
    LoggedOut,
    /// Access token was renewed silently.
    TokenRefreshed {
        /// Unix milliseconds of the new expiry, when the server sent one.
        expires_at_millis: Option<i64>,
    },
    /// The authorization server rejected a login or refresh.
    AuthFailed {
        code: String,
        description: Option<String>,
    },
}

impl AuthEvent {
    /// Short human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            AuthEvent::LoginStarted => "Login started",
            AuthEvent::LoggedIn { .. } => "Logged in",
            AuthEvent::LoggedOut => "Logged out",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed",
            AuthEvent::AuthFailed { .. } => "Authentication failed",
        }
    }
}

/// Central broadcast channel for [`AuthEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    /// Creates a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when nobody is subscribed.
    pub fn emit(&self, event: AuthEvent) -> Result<usize, SendError<AuthEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber receiving all future events.
    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
