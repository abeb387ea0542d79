use anyhow::{anyhow, Result};
use warden_lifecycle::EnvironmentLifecycle;

use crate::output::{format_info, to_json};

/// Execute the remediate command
pub async fn execute(lifecycle: &EnvironmentLifecycle, json: bool) -> Result<()> {
    let bundle = lifecycle
        .write_remediation("requested from the command line")
        .await
        .ok_or_else(|| anyhow!("could not write remediation bundle"))?;

    if json {
        println!("{}", to_json(&bundle)?);
    } else {
        println!("{}", format_info(&format!("Instructions: {}", bundle.instructions_path.display())));
        println!("{}", format_info(&format!("Script:       {}", bundle.script_path.display())));
    }
    Ok(())
}
