use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_lifecycle::EnvironmentLifecycle;

use crate::output::{format_status, to_json};

/// Execute the status command
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool, cancel: &CancellationToken) -> Result<()> {
    let status = lifecycle.status(cancel).await;
    debug!(ready = status.ready, "Status collected");

    if json {
        println!("{}", to_json(&status)?);
    } else {
        print!("{}", format_status(&status));
    }
    Ok(())
}
