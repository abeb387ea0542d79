use anyhow::{bail, Result};
use warden_lifecycle::EnvironmentLifecycle;

use crate::commands::require;
use crate::output::format_info;

/// Execute the resources command
pub async fn execute(lifecycle: &EnvironmentLifecycle, memory_gb: Option<u32>, cpus: Option<u32>) -> Result<()> {
    if memory_gb.is_none() && cpus.is_none() {
        bail!("nothing to change; pass --memory and/or --cpus");
    }
    let ok = lifecycle.configure_resources(memory_gb, cpus).await;
    require(ok, "update resource limits")?;
    println!("{}", format_info("Limits apply after `wsl --shutdown`"));
    Ok(())
}
