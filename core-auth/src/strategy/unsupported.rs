use crate::error::Result;
use crate::oauth::ClientHandle;
use bridge_traits::platform::Platform;
use tracing::warn;

/// Stand-in for platforms without a login flow.
#[derive(Debug, Clone)]
pub struct UnsupportedFlow {
    platform: Platform,
}

impl UnsupportedFlow {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    pub async fn run(&self) -> Result<Option<ClientHandle>> {
        warn!(platform = ?self.platform, "OAuth2 login is not supported on this platform");
        Ok(None)
    }
}
