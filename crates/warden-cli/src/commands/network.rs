use anyhow::Result;
use tokio_util::sync::CancellationToken;
use warden_lifecycle::EnvironmentLifecycle;

use crate::output::{format_network, to_json};

/// Execute the network command
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool, cancel: &CancellationToken) -> Result<()> {
    let info = lifecycle.network_info(cancel).await;
    if json {
        println!("{}", to_json(&info)?);
    } else {
        print!("{}", format_network(&info));
    }
    Ok(())
}
