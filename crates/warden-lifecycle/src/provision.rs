//! Distribution provisioning.
//!
//! [`DistributionProvisioner::ensure_distribution`] converges a named
//! distribution to "installed, at the target version, configured and
//! running" from whatever state it finds. Each step is re-verified by
//! listing distributions again, and every call starts from a fresh listing,
//! so an interrupted install is resumed by the next call.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use warden_core::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink};
use warden_core::config::WardenConfig;
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::argv;
use warden_core::parse;
use warden_core::shell::quote;
use warden_core::status::DistributionRecord;

use crate::download::{validate_artifact, ImageDownloader};
use crate::host::{WslHost, ROOT_USER};
use crate::status::StatusProber;

/// Marker written inside the guest once first-boot configuration finished
pub const CONFIGURED_SENTINEL: &str = "/var/lib/warden/.configured";

/// Ensures distributions exist, run, and are configured
pub struct DistributionProvisioner {
    host: WslHost,
    prober: StatusProber,
    downloader: Arc<dyn ImageDownloader>,
    audit: Arc<dyn AuditSink>,
    config: Arc<WardenConfig>,
    /// Serializes every installation-type operation on this host
    install_lock: Mutex<()>,
}

impl DistributionProvisioner {
    pub fn new(
        host: WslHost,
        prober: StatusProber,
        downloader: Arc<dyn ImageDownloader>,
        audit: Arc<dyn AuditSink>,
        config: Arc<WardenConfig>,
    ) -> Self {
        Self {
            host,
            prober,
            downloader,
            audit,
            config,
            install_lock: Mutex::new(()),
        }
    }

    /// Converge `name` to installed, configured and running
    pub async fn ensure_distribution(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<DistributionRecord> {
        let _guard = self.install_lock.lock().await;

        let mut record = match self.prober.find_distribution(name, cancel).await? {
            Some(record) => {
                debug!(distribution = name, state = %record.state, "Distribution present");
                record
            }
            None => self.install(name, cancel).await?,
        };

        let target = self.config.distribution.target_version.to_string();
        if record.version != target {
            record = self.convert_version(name, &record.version, cancel).await?;
        }

        if !record.is_running() {
            record = self.boot(name, cancel).await?;
        }

        if !self.is_configured(name, cancel).await? {
            let result = self.configure(name, cancel).await;
            self.record(AuditEvent::from_result(AuditAction::Configure, name, &result)).await;
            match result {
                Ok(()) => record = self.boot(name, cancel).await?,
                // The distribution stays usable without the failed step.
                Err(e) => warn!(distribution = name, error = %e, "First-boot configuration failed"),
            }
        }

        Ok(record)
    }

    /// Whether first-boot configuration already ran inside `name`
    pub async fn is_configured(&self, name: &str, cancel: &CancellationToken) -> WardenResult<bool> {
        self.host.guest_file_exists(name, CONFIGURED_SENTINEL, cancel).await
    }

    /// Where the image for the configured distribution is cached
    pub fn image_path(&self) -> PathBuf {
        let file_name = self
            .config
            .distribution
            .image_url
            .rsplit('/')
            .next()
            .filter(|segment| !segment.is_empty() && !segment.contains('?'))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-rootfs.tar.gz", self.config.distribution.name));
        self.config.paths.download_dir.join(file_name)
    }

    /// Reuse a cached image when it validates, otherwise download it again
    async fn prepare_image(&self, cancel: &CancellationToken) -> WardenResult<PathBuf> {
        let image = self.image_path();
        let min_bytes = self.config.distribution.min_image_bytes;
        let sha256 = self.config.distribution.image_sha256.as_deref();

        if tokio::fs::try_exists(&image).await.unwrap_or(false) {
            match validate_artifact(&image, min_bytes, sha256).await {
                Ok(size) => {
                    info!(image = %image.display(), size, "Reusing downloaded image");
                    return Ok(image);
                }
                Err(e) => {
                    warn!(image = %image.display(), error = %e, "Discarding invalid image");
                    tokio::fs::remove_file(&image).await?;
                }
            }
        }

        let url = &self.config.distribution.image_url;
        let result = self
            .downloader
            .download(url, &image, self.config.timeouts.download(), cancel)
            .await;
        self.record(AuditEvent::from_result(AuditAction::Download, url.as_str(), &result)).await;
        result?;

        if let Err(e) = validate_artifact(&image, min_bytes, sha256).await {
            let _ = tokio::fs::remove_file(&image).await;
            return Err(e);
        }
        Ok(image)
    }

    async fn install(&self, name: &str, cancel: &CancellationToken) -> WardenResult<DistributionRecord> {
        info!(distribution = name, "Distribution not present, installing");
        let image = self.prepare_image(cancel).await?;

        let install_dir = self.config.paths.install_dir.join(name);
        tokio::fs::create_dir_all(&install_dir).await?;

        let args = vec![
            "--import".to_string(),
            name.to_string(),
            install_dir.to_string_lossy().into_owned(),
            image.to_string_lossy().into_owned(),
            "--version".to_string(),
            self.config.distribution.target_version.to_string(),
        ];
        let result = match self.host.wsl(&args, self.config.timeouts.install(), cancel).await {
            Ok(result) => result,
            Err(e) => {
                self.record(AuditEvent::new(AuditAction::Import, name, AuditOutcome::Failed).with_details(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let imported = if result.success() {
            self.prober.find_distribution(name, cancel).await?
        } else {
            None
        };

        let outcome = match imported {
            Some(mut record) => {
                record.install_path = Some(install_dir.to_string_lossy().into_owned());
                Ok(record)
            }
            None => {
                let stderr = parse::sanitize(&result.error_text());
                let stderr = if result.success() {
                    format!("import reported success but {} is not listed", name)
                } else {
                    stderr
                };
                Err(WardenError::ImportFailed {
                    distribution: name.to_string(),
                    hint: parse::import_failure_hint(&stderr).map(str::to_string),
                    stderr,
                })
            }
        };
        self.record(AuditEvent::from_result(AuditAction::Import, name, &outcome)).await;
        outcome
    }

    async fn convert_version(
        &self,
        name: &str,
        current: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<DistributionRecord> {
        let target = self.config.distribution.target_version.to_string();
        info!(distribution = name, from = current, to = %target, "Converting distribution version");

        let args = argv(["--set-version", name, target.as_str()]);
        let result = self
            .host
            .wsl_ok(&args, self.config.timeouts.install(), cancel)
            .await
            .map(|_| ());
        self.record(AuditEvent::from_result(AuditAction::SetVersion, name, &result)).await;
        result?;

        let record = self.require(name, cancel).await?;
        if record.version != target {
            return Err(WardenError::provision(format!(
                "{} is still at version {} after conversion",
                name, record.version
            )));
        }
        Ok(record)
    }

    /// Force a boot with a trivial command and confirm it is running
    async fn boot(&self, name: &str, cancel: &CancellationToken) -> WardenResult<DistributionRecord> {
        debug!(distribution = name, "Booting distribution");
        self.host
            .guest_ok(name, Some(ROOT_USER), &argv(["true"]), self.config.timeouts.install(), cancel)
            .await?;

        let record = self.require(name, cancel).await?;
        if !record.is_running() {
            return Err(WardenError::provision(format!(
                "{} is {} after boot",
                name, record.state
            )));
        }
        Ok(record)
    }

    /// Run first-boot configuration, then restart so the init system and
    /// default user take effect
    async fn configure(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        info!(distribution = name, "Running first-boot configuration");
        self.host
            .script(
                name,
                Some(ROOT_USER),
                &first_boot_script(&self.config),
                self.config.timeouts.install(),
                cancel,
            )
            .await
            .map_err(|e| WardenError::configuration_failed(e.to_string()))?;

        self.host
            .wsl_ok(&argv(["--terminate", name]), self.host.command_timeout(), cancel)
            .await
            .map_err(|e| WardenError::configuration_failed(e.to_string()))?;
        Ok(())
    }

    async fn require(&self, name: &str, cancel: &CancellationToken) -> WardenResult<DistributionRecord> {
        self.prober
            .find_distribution(name, cancel)
            .await?
            .ok_or_else(|| WardenError::not_found(format!("distribution {} is not listed", name)))
    }

    /// Install the host subsystem itself. Fails with `PermissionDenied` when
    /// the caller is not elevated.
    pub async fn install_subsystem(&self, cancel: &CancellationToken) -> WardenResult<()> {
        let _guard = self.install_lock.lock().await;
        let result = self.install_subsystem_locked(cancel).await;
        self.record(AuditEvent::from_result(AuditAction::InstallSubsystem, "host", &result)).await;
        result
    }

    async fn install_subsystem_locked(&self, cancel: &CancellationToken) -> WardenResult<()> {
        info!("Installing the host subsystem");
        let result = self
            .host
            .wsl(&argv(["--install", "--no-distribution"]), self.config.timeouts.install(), cancel)
            .await?;
        if !result.success() {
            let text = result.error_text();
            return Err(if needs_elevation(&text) {
                WardenError::permission_denied(parse::sanitize(&text))
            } else {
                WardenError::command("wsl.exe --install", parse::sanitize(&text))
            });
        }

        let target = self.config.distribution.target_version.to_string();
        self.host
            .wsl_ok(&argv(["--set-default-version", target.as_str()]), self.host.command_timeout(), cancel)
            .await?;
        Ok(())
    }

    /// Back up a distribution to a tar archive on the host
    pub async fn export_distribution(
        &self,
        name: &str,
        dest: &std::path::Path,
        cancel: &CancellationToken,
    ) -> WardenResult<()> {
        let _guard = self.install_lock.lock().await;
        self.require(name, cancel).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let args = vec![
            "--export".to_string(),
            name.to_string(),
            dest.to_string_lossy().into_owned(),
        ];
        let result = self
            .host
            .wsl_ok(&args, self.config.timeouts.install(), cancel)
            .await
            .map(|_| ());
        self.record(AuditEvent::from_result(AuditAction::Export, name, &result)).await;
        result
    }

    /// Remove a distribution and its virtual disk
    pub async fn unregister_distribution(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let _guard = self.install_lock.lock().await;
        self.require(name, cancel).await?;
        let result = self
            .host
            .wsl_ok(&argv(["--unregister", name]), self.config.timeouts.install(), cancel)
            .await
            .map(|_| ());
        self.record(AuditEvent::from_result(AuditAction::Unregister, name, &result)).await;
        result
    }

    /// Stop one distribution
    pub async fn terminate_distribution(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self
            .host
            .wsl_ok(&argv(["--terminate", name]), self.host.command_timeout(), cancel)
            .await
            .map(|_| ());
        self.record(AuditEvent::from_result(AuditAction::Terminate, name, &result)).await;
        result
    }

    /// Stop every distribution and the utility VM
    pub async fn shutdown(&self, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self
            .host
            .wsl_ok(&argv(["--shutdown"]), self.host.command_timeout(), cancel)
            .await
            .map(|_| ());
        self.record(AuditEvent::from_result(AuditAction::Shutdown, "host", &result)).await;
        result
    }

    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "Failed to write audit event");
        }
    }
}

/// Whether host tool output asks for an elevated caller
pub fn needs_elevation(text: &str) -> bool {
    let lower = parse::sanitize(text).to_ascii_lowercase();
    ["elevat", "administrator", "access is denied", "0x80070005", "requires admin"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Root script run once on first boot
pub fn first_boot_script(config: &WardenConfig) -> String {
    let user = quote(&config.distribution.default_user);
    let packages = config
        .distribution
        .packages
        .iter()
        .map(|p| quote(p))
        .collect::<Vec<_>>()
        .join(" ");
    let wsl_conf = format!(
        "[boot]\nsystemd=true\n\n[user]\ndefault={}\n",
        config.distribution.default_user
    );
    let sentinel_dir = CONFIGURED_SENTINEL
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("/var/lib/warden");

    let mut script = String::from("set -e\nexport DEBIAN_FRONTEND=noninteractive\n");
    if !packages.is_empty() {
        script.push_str("apt-get update\n");
        script.push_str(&format!("apt-get install -y --no-install-recommends {}\n", packages));
    }
    script.push_str(&format!(
        "id -u {user} >/dev/null 2>&1 || useradd -m -s /bin/bash {user}\n"
    ));
    script.push_str(&format!(
        "printf '%s\\n' {} > /etc/sudoers.d/warden\n",
        quote(&format!("{} ALL=(ALL) NOPASSWD:ALL", config.distribution.default_user))
    ));
    script.push_str("chmod 0440 /etc/sudoers.d/warden\n");
    script.push_str(&format!("printf '%s' {} > /etc/wsl.conf\n", quote(&wsl_conf)));
    script.push_str(&format!("mkdir -p {}\n", quote(sentinel_dir)));
    script.push_str(&format!("touch {}\n", quote(CONFIGURED_SENTINEL)));
    script
}
