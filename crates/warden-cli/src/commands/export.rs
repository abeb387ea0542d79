use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use warden_lifecycle::EnvironmentLifecycle;

use crate::output::format_success;

/// Execute the export command
pub async fn execute(lifecycle: &EnvironmentLifecycle, dest: &Path, cancel: &CancellationToken) -> Result<()> {
    lifecycle.export_distribution(dest, cancel).await?;
    println!(
        "{}",
        format_success(&format!(
            "exported {} to {}",
            lifecycle.config().distribution.name,
            dest.display()
        ))
    );
    Ok(())
}
