//! Public entry point composing the lifecycle components.
//!
//! Every method here catches errors at its boundary: status and health
//! calls always return a structured value, mutating calls return a boolean
//! or an outcome enum and log the underlying error.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use warden_core::audit::{AuditAction, AuditEvent, AuditSink, JsonlAuditSink, NoopAuditSink};
use warden_core::config::{ProxySettings, ResourceConfig, WardenConfig};
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::{CommandExecutor, ProcessExecutor};
use warden_core::health::AggregateHealthResult;
use warden_core::network::NetworkInfo;
use warden_core::parse::ContainerState;
use warden_core::status::{DistributionRecord, EnvironmentStatus};

use crate::checks::ServiceChecker;
use crate::download::{HttpImageDownloader, ImageDownloader};
use crate::health::HealthMonitor;
use crate::host::WslHost;
use crate::network::NetworkResolver;
use crate::orchestrator::{ServiceOrchestrator, StartOutcome, StartReport};
use crate::probe::{ConnectivityProbe, HttpProbe, ReqwestHttpProbe, TcpConnectivityProbe};
use crate::provision::DistributionProvisioner;
use crate::remediation::{self, RemediationBundle};
use crate::runtime::ContainerRuntime;
use crate::status::StatusProber;
use crate::sync::{self, SyncMethod};
use crate::{proxy, resources};

/// Distribution and service state reached by [`EnvironmentLifecycle::ensure_ready`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyReport {
    pub distribution: DistributionRecord,
    pub services: StartOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReadyOutcome {
    /// Distribution running and every service healthy
    Ready(ReadyReport),
    /// Distribution running, some services failed or stayed unhealthy
    Degraded(ReadyReport),
    /// First-time setup needs an administrator
    NeedsElevation(RemediationBundle),
    Failed { reason: String },
}

impl ReadyOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadyOutcome::Ready(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    Installed,
    NeedsElevation(RemediationBundle),
    Failed { reason: String },
}

/// Builds an [`EnvironmentLifecycle`], defaulting every collaborator to its
/// real implementation
pub struct LifecycleBuilder {
    config: WardenConfig,
    executor: Option<Arc<dyn CommandExecutor>>,
    downloader: Option<Arc<dyn ImageDownloader>>,
    http: Option<Arc<dyn HttpProbe>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl LifecycleBuilder {
    pub fn new(config: WardenConfig) -> Self {
        Self {
            config,
            executor: None,
            downloader: None,
            http: None,
            connectivity: None,
            audit: None,
        }
    }

    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn downloader(mut self, downloader: Arc<dyn ImageDownloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn http_probe(mut self, http: Arc<dyn HttpProbe>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn connectivity_probe(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn build(self) -> WardenResult<EnvironmentLifecycle> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ProcessExecutor::new()));
        let downloader: Arc<dyn ImageDownloader> = match self.downloader {
            Some(downloader) => downloader,
            None => Arc::new(HttpImageDownloader::new()?),
        };
        let http: Arc<dyn HttpProbe> = match self.http {
            Some(http) => http,
            None => Arc::new(ReqwestHttpProbe::new()?),
        };
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(TcpConnectivityProbe));
        let audit: Arc<dyn AuditSink> = match (self.audit, &config.paths.audit_log) {
            (Some(audit), _) => audit,
            (None, Some(path)) => Arc::new(JsonlAuditSink::new(path)),
            (None, None) => Arc::new(NoopAuditSink),
        };

        let host = WslHost::new(executor, config.timeouts.command());
        let prober = StatusProber::new(host.clone(), config.clone());
        let network = NetworkResolver::new(host.clone(), connectivity, config.clone());
        let runtime = ContainerRuntime::new(
            host.clone(),
            config.distribution.name.clone(),
            config.timeouts.install(),
        );
        let checker = ServiceChecker::new(runtime.clone(), http, config.services.clone(), config.timeouts.probe());
        let provisioner = DistributionProvisioner::new(
            host.clone(),
            prober.clone(),
            downloader,
            audit.clone(),
            config.clone(),
        );
        let orchestrator = ServiceOrchestrator::new(
            runtime,
            checker.clone(),
            network.clone(),
            audit.clone(),
            config.clone(),
        );
        let monitor = HealthMonitor::new(prober.clone(), network.clone(), checker, config.clone());

        Ok(EnvironmentLifecycle {
            config,
            host,
            prober,
            provisioner,
            network,
            orchestrator,
            monitor,
            audit,
        })
    }
}

/// Facade over provisioning, services, health and host configuration
pub struct EnvironmentLifecycle {
    config: Arc<WardenConfig>,
    host: WslHost,
    prober: StatusProber,
    provisioner: DistributionProvisioner,
    network: NetworkResolver,
    orchestrator: ServiceOrchestrator,
    monitor: HealthMonitor,
    audit: Arc<dyn AuditSink>,
}

impl EnvironmentLifecycle {
    /// Facade with real processes, HTTP and the configured audit log
    pub fn new(config: WardenConfig) -> WardenResult<Self> {
        LifecycleBuilder::new(config).build()
    }

    pub fn builder(config: WardenConfig) -> LifecycleBuilder {
        LifecycleBuilder::new(config)
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    fn distribution(&self) -> &str {
        &self.config.distribution.name
    }

    /// Install the subsystem if needed, provision the distribution, start
    /// every service and verify them
    pub async fn ensure_ready(&self, cancel: &CancellationToken) -> ReadyOutcome {
        let status = self.prober.get_status(cancel).await;
        if !status.installed {
            info!(message = %status.message, "Host subsystem not available, installing");
            match self.install_subsystem(cancel).await {
                InstallOutcome::Installed => {}
                InstallOutcome::NeedsElevation(bundle) => return ReadyOutcome::NeedsElevation(bundle),
                InstallOutcome::Failed { reason } => return ReadyOutcome::Failed { reason },
            }
            let status = self.prober.get_status(cancel).await;
            if !status.installed {
                return ReadyOutcome::Failed {
                    reason: format!("{}; a restart of Windows may be required", status.message),
                };
            }
        }

        let distribution = match self.provisioner.ensure_distribution(self.distribution(), cancel).await {
            Ok(record) => record,
            Err(e) => return self.failure_outcome("provision distribution", e).await,
        };

        match self.orchestrator.start_and_verify(cancel).await {
            Ok(services) => {
                let healthy = services.healthy();
                let report = ReadyReport { distribution, services };
                if healthy {
                    info!(distribution = %self.distribution(), "Environment ready");
                    ReadyOutcome::Ready(report)
                } else {
                    warn!(distribution = %self.distribution(), "Environment running with unhealthy services");
                    ReadyOutcome::Degraded(report)
                }
            }
            Err(e) => self.failure_outcome("start services", e).await,
        }
    }

    async fn failure_outcome(&self, operation: &str, e: WardenError) -> ReadyOutcome {
        if e.is_permission_denied() {
            return match self.write_remediation(&e.to_string()).await {
                Some(bundle) => ReadyOutcome::NeedsElevation(bundle),
                None => ReadyOutcome::Failed { reason: e.to_string() },
            };
        }
        error!(operation, error = %e, "Lifecycle operation failed");
        ReadyOutcome::Failed {
            reason: format!("{}: {}", operation, e),
        }
    }

    /// Install the host subsystem; without elevation, write the remediation
    /// bundle instead
    pub async fn install_subsystem(&self, cancel: &CancellationToken) -> InstallOutcome {
        match self.provisioner.install_subsystem(cancel).await {
            Ok(()) => InstallOutcome::Installed,
            Err(e) if e.is_permission_denied() => match self.write_remediation(&e.to_string()).await {
                Some(bundle) => InstallOutcome::NeedsElevation(bundle),
                None => InstallOutcome::Failed { reason: e.to_string() },
            },
            Err(e) if e.is_not_found() => {
                error!(error = %e, "Host subsystem tool missing");
                InstallOutcome::Failed {
                    reason: WardenError::unavailable(e.to_string()).to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Host subsystem installation failed");
                InstallOutcome::Failed { reason: e.to_string() }
            }
        }
    }

    /// Write the remediation bundle
    pub async fn write_remediation(&self, reason: &str) -> Option<RemediationBundle> {
        match remediation::write_bundle(&self.config, reason).await {
            Ok(bundle) => {
                warn!(directory = %bundle.directory.display(), "Administrator action required");
                Some(bundle)
            }
            Err(e) => {
                error!(error = %e, "Could not write remediation bundle");
                None
            }
        }
    }

    /// Fresh status snapshot; never fails
    pub async fn status(&self, cancel: &CancellationToken) -> EnvironmentStatus {
        self.prober.get_status(cancel).await
    }

    /// Aggregate health verdict; never fails
    pub async fn health_check(&self, cancel: &CancellationToken) -> AggregateHealthResult {
        self.monitor.health_check(cancel).await
    }

    /// Network view of the configured distribution; never fails
    pub async fn network_info(&self, cancel: &CancellationToken) -> NetworkInfo {
        self.network.get_network_info(self.distribution(), cancel).await
    }

    /// Start every service without the verify/repair pass
    pub async fn start_all_services(&self, cancel: &CancellationToken) -> bool {
        match self.orchestrator.start_all(cancel).await.and_then(StartReport::into_result) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Starting services failed");
                false
            }
        }
    }

    pub async fn start_service(&self, name: &str, cancel: &CancellationToken) -> bool {
        log_outcome("start service", self.orchestrator.start(name, cancel).await)
    }

    pub async fn stop_service(&self, name: &str, cancel: &CancellationToken) -> bool {
        log_outcome("stop service", self.orchestrator.stop(name, cancel).await)
    }

    pub async fn restart_service(&self, name: &str, cancel: &CancellationToken) -> bool {
        log_outcome("restart service", self.orchestrator.restart(name, cancel).await)
    }

    pub async fn container_statuses(&self, cancel: &CancellationToken) -> WardenResult<BTreeMap<String, ContainerState>> {
        self.orchestrator.container_statuses(cancel).await
    }

    /// Copy host directory `source` into guest directory `destination`
    pub async fn sync_files(&self, source: &Path, destination: &str, cancel: &CancellationToken) -> bool {
        let result = sync::sync_files(
            &self.host,
            self.distribution(),
            Some(self.config.distribution.default_user.as_str()),
            source,
            destination,
            self.config.timeouts.install(),
            cancel,
        )
        .await;
        self.record(AuditEvent::from_result(AuditAction::SyncFiles, destination, &result)).await;
        log_outcome("sync files", result.map(|_: SyncMethod| ()))
    }

    pub async fn configure_proxy(&self, settings: &ProxySettings, cancel: &CancellationToken) -> bool {
        let result = proxy::configure_proxy(
            &self.host,
            self.distribution(),
            settings,
            &self.config.paths.wslconfig,
            &self.config.paths.state_dir,
            self.config.timeouts.install(),
            cancel,
        )
        .await;
        self.record(AuditEvent::from_result(AuditAction::ConfigureProxy, self.distribution(), &result))
            .await;
        log_outcome("configure proxy", result)
    }

    /// Persist memory and processor limits; they apply after the next
    /// [`shutdown`](Self::shutdown)
    pub async fn configure_resources(&self, memory_gb: Option<u32>, cpus: Option<u32>) -> bool {
        let resources = ResourceConfig { memory_gb, cpus };
        let result = resources::configure_resources(
            &self.config.paths.wslconfig,
            &self.config.paths.state_dir,
            &resources,
        )
        .await;
        self.record(AuditEvent::from_result(AuditAction::ConfigureResources, "host", &result))
            .await;
        log_outcome("configure resources", result)
    }

    pub async fn export_distribution(&self, dest: &Path, cancel: &CancellationToken) -> WardenResult<()> {
        self.provisioner
            .export_distribution(self.distribution(), dest, cancel)
            .await
    }

    pub async fn unregister_distribution(&self, cancel: &CancellationToken) -> WardenResult<()> {
        self.provisioner
            .unregister_distribution(self.distribution(), cancel)
            .await
    }

    pub async fn terminate_distribution(&self, cancel: &CancellationToken) -> WardenResult<()> {
        self.provisioner
            .terminate_distribution(self.distribution(), cancel)
            .await
    }

    pub async fn shutdown(&self, cancel: &CancellationToken) -> WardenResult<()> {
        self.provisioner.shutdown(cancel).await
    }

    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "Failed to write audit event");
        }
    }
}

fn log_outcome(operation: &str, result: WardenResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!(operation, error = %e, "Operation failed");
            false
        }
    }
}
