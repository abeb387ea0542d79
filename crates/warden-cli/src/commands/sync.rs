use std::path::Path;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use warden_lifecycle::EnvironmentLifecycle;

use crate::commands::require;

/// Execute the sync command
pub async fn execute(
    lifecycle: &EnvironmentLifecycle,
    source: &Path,
    destination: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    if !source.is_dir() {
        bail!("{} is not a directory", source.display());
    }
    let ok = lifecycle.sync_files(source, destination, cancel).await;
    require(ok, &format!("sync {} -> {}", source.display(), destination))
}
