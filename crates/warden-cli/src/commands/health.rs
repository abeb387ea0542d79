use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use warden_lifecycle::EnvironmentLifecycle;

use crate::output::{format_health, to_json};

/// Execute the health command; exits non-zero when unhealthy
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool, cancel: &CancellationToken) -> Result<()> {
    let health = lifecycle.health_check(cancel).await;

    if json {
        println!("{}", to_json(&health)?);
    } else {
        print!("{}", format_health(&health));
    }

    if !health.healthy {
        bail!("environment is not healthy ({} issue(s))", health.issues.len());
    }
    Ok(())
}
