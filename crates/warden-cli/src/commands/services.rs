use anyhow::Result;
use tokio_util::sync::CancellationToken;
use warden_lifecycle::EnvironmentLifecycle;

use crate::commands::require;
use crate::output::{format_containers, to_json};
use crate::ServiceAction;

/// Execute a services subcommand
pub async fn execute(
    lifecycle: &EnvironmentLifecycle,
    action: ServiceAction,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    match action {
        ServiceAction::Ps => {
            let containers = lifecycle.container_statuses(cancel).await?;
            if json {
                println!("{}", to_json(&containers)?);
            } else {
                print!("{}", format_containers(&containers));
            }
            Ok(())
        }
        ServiceAction::Start { name } => {
            let ok = lifecycle.start_service(&name, cancel).await;
            require(ok, &format!("start {}", name))
        }
        ServiceAction::Stop { name } => {
            let ok = lifecycle.stop_service(&name, cancel).await;
            require(ok, &format!("stop {}", name))
        }
        ServiceAction::Restart { name } => {
            let ok = lifecycle.restart_service(&name, cancel).await;
            require(ok, &format!("restart {}", name))
        }
    }
}
