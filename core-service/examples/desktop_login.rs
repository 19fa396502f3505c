//! Interactive desktop login against a real identity provider.
//!
//! Run with:
//! ```bash
//! cargo run -p core-service --example desktop_login -- \
//!     https://idp.example.com/authorize https://idp.example.com/token my-client-id
//! ```
//!
//! The system browser opens on the authorization page; the redirect comes
//! back to a loopback listener on an ephemeral port.

use bridge_traits::time::LogLevel;
use core_auth::{AuthController, AuthHooks};
use core_runtime::config::AuthConfig;
use core_service::{init_logging, AuthDependencies, AuthService, LoggingConfig};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::default().with_level(LogLevel::Debug))?;

    let args: Vec<String> = env::args().skip(1).collect();
    let [authorize, token, client_id] = args.as_slice() else {
        eprintln!("usage: desktop_login <authorization-endpoint> <token-endpoint> <client-id>");
        std::process::exit(2);
    };

    let config = AuthConfig::builder()
        .authorization_endpoint(authorize.as_str())
        .token_endpoint(token.as_str())
        .client_id(client_id.as_str())
        .scopes(["openid", "profile", "email"])
        .build()?;

    let hooks: Arc<dyn AuthHooks<String>> = Arc::new(
        AuthController::new(|claims| {
            claims
                .get("email")
                .or_else(|| claims.get("sub"))
                .and_then(|value| value.as_str())
                .unwrap_or("unknown")
                .to_string()
        })
        .with_on_login(|user| println!("Signed in as {user}"))
        .with_on_logout(|user| println!("Signed out {user}")),
    );

    let service = AuthService::new(config, AuthDependencies::desktop()?, hooks)?;
    if !service.login().await? {
        println!("Login did not complete");
        return Ok(());
    }

    println!("State: {}", service.state().await);
    service.logout().await?;
    Ok(())
}
