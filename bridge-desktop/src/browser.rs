//! Browser launching and host window control on desktop.

use async_trait::async_trait;
use bridge_traits::{
    browser::{UrlLauncher, WindowController},
    error::{BridgeError, Result},
};
use tracing::{debug, warn};

/// Opens URLs in the user's default browser through the `open` crate.
#[derive(Debug, Clone, Default)]
pub struct SystemBrowserLauncher;

#[async_trait]
impl UrlLauncher for SystemBrowserLauncher {
    async fn open_url(&self, url: &str) -> Result<()> {
        let target = url.to_string();
        // `open` may block while the OS resolves a handler.
        let outcome = tokio::task::spawn_blocking(move || open::that_detached(target))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Launcher task failed: {}", e)))?;

        match outcome {
            Ok(()) => {
                debug!("Opened authorization page in system browser");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Could not open system browser");
                Err(BridgeError::NotAvailable(format!(
                    "No browser could be launched: {}",
                    e
                )))
            }
        }
    }
}

/// Window controller for hosts without a window (CLI, tests).
#[derive(Debug, Clone, Default)]
pub struct NoopWindowController;

#[async_trait]
impl WindowController for NoopWindowController {
    async fn minimize(&self) -> Result<()> {
        Ok(())
    }

    async fn restore_and_focus(&self) -> Result<()> {
        Ok(())
    }
}
