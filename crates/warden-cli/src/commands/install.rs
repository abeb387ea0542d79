use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use warden_lifecycle::{EnvironmentLifecycle, InstallOutcome};

use crate::output::{format_info, format_success, format_warning, to_json};
use crate::progress::Spinner;

/// Execute the install command
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool, cancel: &CancellationToken) -> Result<()> {
    let spinner = Spinner::start("Installing WSL", !json);
    let outcome = lifecycle.install_subsystem(cancel).await;
    spinner.finish();

    if json {
        println!("{}", to_json(&outcome)?);
    }

    match outcome {
        InstallOutcome::Installed => {
            if !json {
                println!("{}", format_success("WSL installed; a reboot may be required"));
            }
            Ok(())
        }
        InstallOutcome::NeedsElevation(bundle) => {
            if !json {
                println!("{}", format_warning(&bundle.reason));
                println!("{}", format_info(&format!("Script: {}", bundle.script_path.display())));
            }
            bail!("administrator action required")
        }
        InstallOutcome::Failed { reason } => bail!(reason),
    }
}
