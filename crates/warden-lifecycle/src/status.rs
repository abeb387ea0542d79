//! Read-only environment status probing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::config::WardenConfig;
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::argv;
use warden_core::parse;
use warden_core::status::{DistributionRecord, EnvironmentStatus, Readiness, UNKNOWN_VERSION};

use crate::host::{WslHost, DISM_EXE};

/// Builds [`EnvironmentStatus`] snapshots from the host tool's output
#[derive(Clone)]
pub struct StatusProber {
    host: WslHost,
    config: Arc<WardenConfig>,
}

impl StatusProber {
    pub fn new(host: WslHost, config: Arc<WardenConfig>) -> Self {
        Self { host, config }
    }

    /// Take a fresh snapshot. Never fails: every probe failure degrades the
    /// matching field and shows up in `message`.
    pub async fn get_status(&self, cancel: &CancellationToken) -> EnvironmentStatus {
        let target = self.config.distribution.target_version;
        let name = &self.config.distribution.name;

        let version_output = match self.host.wsl(&argv(["--version"]), self.host.command_timeout(), cancel).await {
            Ok(result) if result.success() => result.stdout,
            Ok(result) => {
                debug!(exit_code = result.exit_code, "Version query failed");
                return self.not_installed(Some(result.error_text()));
            }
            Err(e) => {
                debug!(error = %e, "Version query failed");
                return self.not_installed(Some(e.to_string()));
            }
        };

        let subsystem_version = parse::parse_subsystem_version(&version_output)
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());
        let kernel_version = parse::parse_kernel_version(&version_output)
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        let (features, default_version, distributions) = tokio::join!(
            self.probe_features(cancel),
            self.default_version(cancel),
            self.list_or_empty(cancel),
        );

        let required = distributions.iter().find(|d| d.name.eq_ignore_ascii_case(name));
        let effective_version = required
            .and_then(|d| d.version.parse::<u8>().ok())
            .or(default_version)
            .unwrap_or(2);

        let readiness = Readiness {
            installed: true,
            target_version: effective_version == target,
            has_distribution: required.is_some(),
            any_running: distributions.iter().any(DistributionRecord::is_running),
        };

        EnvironmentStatus {
            installed: true,
            subsystem_version,
            kernel_version,
            is_target_version: readiness.target_version,
            required_host_features_enabled: features,
            has_required_distribution: readiness.has_distribution,
            ready: readiness.ready(),
            message: readiness.message(name, target),
            distributions,
            captured_at: Utc::now(),
        }
    }

    /// List installed distributions
    pub async fn list_distributions(&self, cancel: &CancellationToken) -> WardenResult<Vec<DistributionRecord>> {
        let result = self
            .host
            .wsl(&argv(["--list", "--verbose"]), self.host.command_timeout(), cancel)
            .await?;
        let records = parse::parse_distribution_list(&result.stdout);

        // An empty host exits non-zero with an explanatory line and no rows.
        if !result.success() && records.is_empty() {
            let text = parse::sanitize(&result.error_text()).to_ascii_lowercase();
            if text.contains("no installed distributions") || text.is_empty() {
                return Ok(Vec::new());
            }
            return Err(WardenError::command("wsl.exe --list --verbose", result.error_text()));
        }
        Ok(records)
    }

    /// Look up one distribution by name
    pub async fn find_distribution(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<Option<DistributionRecord>> {
        Ok(self
            .list_distributions(cancel)
            .await?
            .into_iter()
            .find(|d| d.name.eq_ignore_ascii_case(name)))
    }

    async fn list_or_empty(&self, cancel: &CancellationToken) -> Vec<DistributionRecord> {
        match self.list_distributions(cancel).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not list distributions");
                Vec::new()
            }
        }
    }

    async fn default_version(&self, cancel: &CancellationToken) -> Option<u8> {
        match self.host.wsl(&argv(["--status"]), self.host.command_timeout(), cancel).await {
            Ok(result) => parse::parse_default_version(&result.stdout),
            Err(e) => {
                debug!(error = %e, "Status query failed");
                None
            }
        }
    }

    /// Each feature is probed independently; anything short of a confirmed
    /// "Enabled" counts as not enabled
    async fn probe_features(&self, cancel: &CancellationToken) -> BTreeMap<String, bool> {
        let mut features = BTreeMap::new();
        for feature in &self.config.required_features {
            let args = vec![
                "/online".to_string(),
                "/get-featureinfo".to_string(),
                format!("/featurename:{}", feature),
            ];
            let enabled = match self.host.host_tool(DISM_EXE, &args, cancel).await {
                Ok(result) if result.success() => parse::parse_feature_enabled(&result.stdout).unwrap_or(false),
                Ok(result) => {
                    debug!(feature = %feature, exit_code = result.exit_code, "Feature probe not confirmed");
                    false
                }
                Err(e) => {
                    debug!(feature = %feature, error = %e, "Feature probe failed");
                    false
                }
            };
            features.insert(feature.clone(), enabled);
        }
        features
    }

    fn not_installed(&self, detail: Option<String>) -> EnvironmentStatus {
        let readiness = Readiness {
            installed: false,
            target_version: false,
            has_distribution: false,
            any_running: false,
        };
        let base = readiness.message(&self.config.distribution.name, self.config.distribution.target_version);
        let message = match detail.map(|d| parse::sanitize(&d)).filter(|d| !d.trim().is_empty()) {
            Some(detail) => format!("{} ({})", base, detail.trim()),
            None => base,
        };
        EnvironmentStatus::not_installed(message)
    }
}
