use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_lifecycle::{EnvironmentLifecycle, ReadyOutcome};

use crate::output::{format_info, format_success, format_warning, to_json};
use crate::progress::Spinner;

/// Execute the up command
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool, cancel: &CancellationToken) -> Result<()> {
    let name = &lifecycle.config().distribution.name;
    info!(distribution = %name, "Bringing environment up");

    let spinner = Spinner::start(&format!("Preparing {}", name), !json);
    let outcome = lifecycle.ensure_ready(cancel).await;
    spinner.finish();

    if json {
        println!("{}", to_json(&outcome)?);
    }

    match outcome {
        ReadyOutcome::Ready(report) => {
            if !json {
                println!(
                    "{}",
                    format_success(&format!(
                        "{} is running with {} healthy service(s)",
                        report.distribution.name,
                        report.services.checks.len()
                    ))
                );
            }
            Ok(())
        }
        ReadyOutcome::Degraded(report) => {
            if !json {
                for (service, error) in &report.services.report.failures {
                    println!("{}", format_warning(&format!("{}: {}", service, error)));
                }
                for check in report.services.checks.iter().filter(|c| !c.healthy) {
                    println!("{}", format_warning(&format!("{}: {}", check.service_name, check.details)));
                }
            }
            bail!("environment is up but degraded")
        }
        ReadyOutcome::NeedsElevation(bundle) => {
            if !json {
                println!("{}", format_warning(&bundle.reason));
                println!(
                    "{}",
                    format_info(&format!(
                        "Ask an administrator to follow {}",
                        bundle.instructions_path.display()
                    ))
                );
            }
            bail!("administrator action required")
        }
        ReadyOutcome::Failed { reason } => bail!(reason),
    }
}
