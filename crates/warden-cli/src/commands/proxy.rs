use anyhow::Result;
use tokio_util::sync::CancellationToken;
use warden_core::config::ProxySettings;
use warden_lifecycle::EnvironmentLifecycle;

use crate::commands::require;

/// Execute the proxy command
pub async fn execute(lifecycle: &EnvironmentLifecycle, settings: &ProxySettings, cancel: &CancellationToken) -> Result<()> {
    let what = if settings.is_empty() {
        "clear proxy settings"
    } else {
        "configure proxy"
    };
    let ok = lifecycle.configure_proxy(settings, cancel).await;
    require(ok, what)
}
