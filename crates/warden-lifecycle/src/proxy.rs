//! Proxy configuration for the guest and its container runtime.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::config::ProxySettings;
use warden_core::envfile::{self, EnvFile};
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::argv;
use warden_core::shell::quote;

use crate::host::{WslHost, ROOT_USER};
use crate::resources::{WslConfigFile, WSL2_SECTION};

pub const PROFILE_PATH: &str = "/etc/profile.d/warden-proxy.sh";
pub const DOCKER_DROPIN_PATH: &str = "/etc/systemd/system/docker.service.d/warden-proxy.conf";

/// SOCKS endpoint of the locally installed anonymizing proxy
pub const ANONYMIZER_SOCKS: &str = "socks5h://127.0.0.1:9050";

const ANONYMIZER_INSTALL_SCRIPT: &str = "set -e\nexport DEBIAN_FRONTEND=noninteractive\ncommand -v tor >/dev/null 2>&1 || { apt-get update && apt-get install -y tor; }\nsystemctl enable --now tor 2>/dev/null || service tor start\n";
const DOCKER_RELOAD_SCRIPT: &str = "systemctl daemon-reload && systemctl restart docker";

/// Settings with the anonymizer default filled in
pub fn effective_settings(settings: &ProxySettings) -> ProxySettings {
    let mut effective = settings.clone();
    if effective.install_anonymizer && effective.socks.is_none() {
        effective.socks = Some(ANONYMIZER_SOCKS.to_string());
    }
    effective
}

/// Reject values that would break out of the files they are written to
pub fn validate(settings: &ProxySettings) -> WardenResult<()> {
    let values = [&settings.http, &settings.https, &settings.socks, &settings.no_proxy];
    for value in values.into_iter().flatten() {
        if value.trim().is_empty() || value.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
            return Err(WardenError::validation(format!("invalid proxy value: {:?}", value)));
        }
    }
    Ok(())
}

/// `(name, value)` pairs exported in upper and lower case
fn variables(settings: &ProxySettings) -> Vec<(&'static str, &str)> {
    let mut vars = Vec::new();
    let pairs: [(&'static str, &'static str, &Option<String>); 4] = [
        ("HTTP_PROXY", "http_proxy", &settings.http),
        ("HTTPS_PROXY", "https_proxy", &settings.https),
        ("ALL_PROXY", "all_proxy", &settings.socks),
        ("NO_PROXY", "no_proxy", &settings.no_proxy),
    ];
    for (upper, lower, value) in pairs {
        if let Some(value) = value {
            vars.push((upper, value.as_str()));
            vars.push((lower, value.as_str()));
        }
    }
    vars
}

/// Login-shell profile snippet
pub fn profile_script(settings: &ProxySettings) -> String {
    let mut script = String::from("# Managed by warden\n");
    for (name, value) in variables(settings) {
        script.push_str(&format!("export {}={}\n", name, quote(value)));
    }
    script
}

/// systemd drop-in giving the container runtime daemon the same proxy
pub fn docker_dropin(settings: &ProxySettings) -> String {
    let mut unit = String::from("# Managed by warden\n[Service]\n");
    for (name, value) in variables(settings) {
        if name.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
            unit.push_str(&format!("Environment=\"{}={}\"\n", name, value));
        }
    }
    unit
}

/// Apply `settings` to the guest, the host cache and `.wslconfig`. Empty
/// settings remove the managed files.
pub async fn configure_proxy(
    host: &WslHost,
    distribution: &str,
    settings: &ProxySettings,
    wslconfig: &Path,
    state_dir: &Path,
    install_timeout: std::time::Duration,
    cancel: &CancellationToken,
) -> WardenResult<()> {
    validate(settings)?;
    let settings = effective_settings(settings);

    if settings.install_anonymizer {
        info!(distribution, "Installing anonymizing proxy");
        host.script(distribution, Some(ROOT_USER), ANONYMIZER_INSTALL_SCRIPT, install_timeout, cancel)
            .await?;
    }

    if settings.is_empty() {
        host.guest_ok(
            distribution,
            Some(ROOT_USER),
            &argv(["rm", "-f", PROFILE_PATH, DOCKER_DROPIN_PATH]),
            host.command_timeout(),
            cancel,
        )
        .await?;
    } else {
        host.write_guest_file(distribution, PROFILE_PATH, &profile_script(&settings), cancel)
            .await?;
        host.write_guest_file(distribution, DOCKER_DROPIN_PATH, &docker_dropin(&settings), cancel)
            .await?;
    }

    // The daemon may not be installed yet; the drop-in applies when it is.
    if let Err(e) = host
        .script(distribution, Some(ROOT_USER), DOCKER_RELOAD_SCRIPT, host.command_timeout(), cancel)
        .await
    {
        warn!(distribution, error = %e, "Container runtime not reloaded");
    }

    let mut wsl = WslConfigFile::load(wslconfig).await?;
    if settings.http.is_some() || settings.https.is_some() || settings.socks.is_some() {
        wsl.set(WSL2_SECTION, "autoProxy", "false");
    } else {
        wsl.remove(WSL2_SECTION, "autoProxy");
    }
    wsl.save(wslconfig).await?;

    let cache_path = envfile::cache_path(state_dir);
    let mut cache = EnvFile::load(&cache_path).await?;
    let cached = [
        ("WARDEN_HTTP_PROXY", &settings.http),
        ("WARDEN_HTTPS_PROXY", &settings.https),
        ("WARDEN_SOCKS_PROXY", &settings.socks),
        ("WARDEN_NO_PROXY", &settings.no_proxy),
    ];
    for (key, value) in cached {
        match value {
            Some(value) => cache.set(key, value.as_str()),
            None => cache.remove(key),
        }
    }
    cache.save(&cache_path).await?;

    info!(distribution, "Proxy configuration applied");
    Ok(())
}
