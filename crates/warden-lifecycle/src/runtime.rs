//! Container runtime commands issued inside the guest.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::CommandResult;
use warden_core::parse::{self, ContainerState};
use warden_core::service::ServiceDefinition;

use crate::host::{WslHost, ROOT_USER};

const DOCKER: &str = "docker";

const INSTALL_SCRIPT: &str = "set -e\nexport DEBIAN_FRONTEND=noninteractive\napt-get update\napt-get install -y docker.io\n";
const START_DAEMON_SCRIPT: &str = "systemctl start docker 2>/dev/null || service docker start";

/// Container runtime of one distribution
#[derive(Clone)]
pub struct ContainerRuntime {
    host: WslHost,
    distribution: String,
    install_timeout: Duration,
}

impl ContainerRuntime {
    pub fn new(host: WslHost, distribution: impl Into<String>, install_timeout: Duration) -> Self {
        Self {
            host,
            distribution: distribution.into(),
            install_timeout,
        }
    }

    pub fn distribution(&self) -> &str {
        &self.distribution
    }

    async fn docker(&self, args: &[&str], cancel: &CancellationToken) -> WardenResult<CommandResult> {
        let mut full = vec![DOCKER.to_string()];
        full.extend(args.iter().map(|a| a.to_string()));
        self.docker_argv(&full, cancel).await
    }

    async fn docker_argv(&self, full: &[String], cancel: &CancellationToken) -> WardenResult<CommandResult> {
        self.host
            .guest(&self.distribution, Some(ROOT_USER), full, self.host.command_timeout(), cancel)
            .await
    }

    fn failure(&self, what: &str, result: &CommandResult) -> WardenError {
        WardenError::command(format!("docker {}", what), result.error_text())
    }

    /// Whether the runtime binary is present
    pub async fn is_installed(&self, cancel: &CancellationToken) -> WardenResult<bool> {
        Ok(self.docker(&["--version"], cancel).await?.success())
    }

    /// Install the runtime package
    pub async fn install(&self, cancel: &CancellationToken) -> WardenResult<()> {
        info!(distribution = %self.distribution, "Installing container runtime");
        self.host
            .script(&self.distribution, Some(ROOT_USER), INSTALL_SCRIPT, self.install_timeout, cancel)
            .await?;
        Ok(())
    }

    /// Whether the runtime daemon answers
    pub async fn daemon_running(&self, cancel: &CancellationToken) -> WardenResult<bool> {
        Ok(self
            .docker(&["info", "--format", "{{.ServerVersion}}"], cancel)
            .await?
            .success())
    }

    pub async fn start_daemon(&self, cancel: &CancellationToken) -> WardenResult<()> {
        info!(distribution = %self.distribution, "Starting container runtime daemon");
        self.host
            .script(&self.distribution, Some(ROOT_USER), START_DAEMON_SCRIPT, self.host.command_timeout(), cancel)
            .await?;
        Ok(())
    }

    /// Install the runtime if absent and start its daemon if stopped
    pub async fn ensure_ready(&self, cancel: &CancellationToken) -> WardenResult<()> {
        if !self.is_installed(cancel).await? {
            self.install(cancel).await?;
        }
        if !self.daemon_running(cancel).await? {
            self.start_daemon(cancel).await?;
            if !self.daemon_running(cancel).await? {
                return Err(WardenError::unavailable(format!(
                    "container runtime daemon in {} did not start",
                    self.distribution
                )));
            }
        }
        Ok(())
    }

    /// Create `network` unless it already exists
    pub async fn ensure_network(&self, network: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self.docker(&["network", "ls", "--format", "{{.Name}}"], cancel).await?;
        if !result.success() {
            return Err(self.failure("network ls", &result));
        }
        if parse::sanitize(&result.stdout).lines().any(|l| l.trim() == network) {
            debug!(network, "Network exists");
            return Ok(());
        }

        info!(network, "Creating container network");
        let result = self.docker(&["network", "create", network], cancel).await?;
        if !result.success() {
            return Err(self.failure("network create", &result));
        }
        Ok(())
    }

    /// Remove a container; a missing container counts as removed
    pub async fn remove(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self.docker(&["rm", "-f", name], cancel).await?;
        if result.success() || is_no_such_container(&result) {
            Ok(())
        } else {
            Err(self.failure("rm", &result))
        }
    }

    /// Launch a fresh container for `service`
    pub async fn run(
        &self,
        service: &ServiceDefinition,
        default_network: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<()> {
        let mut full = vec![DOCKER.to_string()];
        full.extend(service.run_args(default_network));
        let result = self.docker_argv(&full, cancel).await?;
        if result.success() {
            Ok(())
        } else {
            Err(self.failure("run", &result))
        }
    }

    pub async fn stop(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self.docker(&["stop", name], cancel).await?;
        if result.success() {
            Ok(())
        } else if is_no_such_container(&result) {
            Err(WardenError::not_found(format!("container {}", name)))
        } else {
            Err(self.failure("stop", &result))
        }
    }

    pub async fn start(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let result = self.docker(&["start", name], cancel).await?;
        if result.success() {
            Ok(())
        } else if is_no_such_container(&result) {
            Err(WardenError::not_found(format!("container {}", name)))
        } else {
            Err(self.failure("start", &result))
        }
    }

    /// Every container, running or not, by name
    pub async fn list(&self, cancel: &CancellationToken) -> WardenResult<BTreeMap<String, ContainerState>> {
        let result = self
            .docker(&["ps", "-a", "--format", "{{.Names}}\t{{.Status}}"], cancel)
            .await?;
        if !result.success() {
            return Err(self.failure("ps", &result));
        }
        Ok(parse::parse_container_list(&result.stdout))
    }

    /// Runtime health state ("healthy", "unhealthy", "starting"), or `None`
    /// when the container declares no health check
    pub async fn health_status(&self, name: &str, cancel: &CancellationToken) -> WardenResult<Option<String>> {
        let result = self
            .docker(
                &["inspect", "--format", "{{if .State.Health}}{{.State.Health.Status}}{{end}}", name],
                cancel,
            )
            .await?;
        if !result.success() {
            return Err(self.failure("inspect", &result));
        }
        let status = parse::sanitize(&result.stdout).trim().to_string();
        Ok((!status.is_empty()).then_some(status))
    }

    /// Used memory per running container, in bytes
    pub async fn memory_stats(&self, cancel: &CancellationToken) -> WardenResult<BTreeMap<String, u64>> {
        let result = self
            .docker(&["stats", "--no-stream", "--format", "{{.Name}}\t{{.MemUsage}}"], cancel)
            .await?;
        if !result.success() {
            return Err(self.failure("stats", &result));
        }
        Ok(parse::parse_memory_stats(&result.stdout))
    }
}

fn is_no_such_container(result: &CommandResult) -> bool {
    result.error_text().to_ascii_lowercase().contains("no such container")
}
