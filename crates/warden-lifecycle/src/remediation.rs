//! Hand-off artifacts for an administrator when first-time setup needs
//! elevation this process does not hold.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use warden_core::config::WardenConfig;
use warden_core::error::WardenResult;

pub const INSTRUCTIONS_FILE: &str = "ENABLE_WSL_INSTRUCTIONS.md";
pub const SCRIPT_FILE: &str = "enable-wsl.ps1";

/// Paths of a written remediation bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationBundle {
    pub directory: PathBuf,
    pub instructions_path: PathBuf,
    pub script_path: PathBuf,
    /// Why the bundle was produced
    pub reason: String,
}

/// Directory the bundle is written to
pub fn bundle_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("remediation")
}

/// Write the instructions document and the elevation script. Content only
/// depends on the configuration, so repeated calls produce identical files.
pub async fn write_bundle(config: &WardenConfig, reason: &str) -> WardenResult<RemediationBundle> {
    let directory = bundle_dir(&config.paths.state_dir);
    tokio::fs::create_dir_all(&directory).await?;

    let instructions_path = directory.join(INSTRUCTIONS_FILE);
    let script_path = directory.join(SCRIPT_FILE);
    tokio::fs::write(&instructions_path, instructions(config)).await?;
    tokio::fs::write(&script_path, elevation_script(config)).await?;

    info!(directory = %directory.display(), "Remediation bundle written");
    Ok(RemediationBundle {
        directory,
        instructions_path,
        script_path,
        reason: reason.to_string(),
    })
}

/// PowerShell script enabling the required features and installing the
/// subsystem. Must be run from an elevated prompt.
pub fn elevation_script(config: &WardenConfig) -> String {
    let mut script = String::new();
    script.push_str("#Requires -RunAsAdministrator\n");
    script.push_str("# Generated by warden. Enables the Windows Subsystem for Linux.\n");
    script.push_str("$ErrorActionPreference = 'Stop'\n\n");
    for feature in &config.required_features {
        script.push_str(&format!(
            "dism.exe /online /enable-feature /featurename:{} /all /norestart\n",
            powershell_literal(feature)
        ));
    }
    script.push_str("\nwsl.exe --install --no-distribution\n");
    script.push_str(&format!(
        "wsl.exe --set-default-version {}\n\n",
        config.distribution.target_version
    ));
    script.push_str("Write-Host 'Done. Restart Windows, then run: warden up'\n");
    script
}

/// Plain-language steps for the administrator
pub fn instructions(config: &WardenConfig) -> String {
    let features = config
        .required_features
        .iter()
        .map(|f| format!("- `{}`\n", f))
        .collect::<String>();
    format!(
        "# Enabling the Windows Subsystem for Linux\n\n\
         warden needs the Windows Subsystem for Linux (version {version}) to run the \
         `{distribution}` environment. Turning it on requires administrator rights, \
         which the current account does not have.\n\n\
         ## What will be enabled\n\n\
         {features}\n\
         ## Steps\n\n\
         1. Open PowerShell with **Run as administrator**.\n\
         2. Run the script next to this file:\n\n\
         ```powershell\n\
         Set-ExecutionPolicy -Scope Process Bypass\n\
         .\\{script}\n\
         ```\n\n\
         3. Restart Windows when the script finishes.\n\
         4. Sign in as the regular user again and run `warden up`.\n\n\
         ## Doing it by hand\n\n\
         Run each `dism.exe` line from `{script}` in an elevated prompt, then \
         `wsl.exe --install --no-distribution` and \
         `wsl.exe --set-default-version {version}`.\n",
        version = config.distribution.target_version,
        distribution = config.distribution.name,
        features = features,
        script = SCRIPT_FILE,
    )
}

/// Keep feature names to the characters DISM accepts
fn powershell_literal(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '.')
        .collect()
}
