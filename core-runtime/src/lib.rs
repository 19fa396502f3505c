//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the authentication core:
//! - Logging and tracing infrastructure
//! - Authentication configuration parsed from the application's settings tree
//! - Event bus and change notifier used to tell the UI about state changes
//!
//! ## Overview
//!
//! `core-auth` and `core-service` depend on this crate for cross-cutting
//! concerns. Nothing here knows about OAuth2 itself beyond the shape of the
//! `auth.*` configuration section.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifier;

pub use config::{AuthConfig, AuthConfigBuilder};
pub use error::{Error, Result};
pub use events::{AuthEvent, EventBus};
pub use notifier::{ListenerId, StateNotifier};
