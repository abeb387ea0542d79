//! Service startup, shutdown and repair.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink};
use warden_core::config::WardenConfig;
use warden_core::error::{WardenError, WardenResult};
use warden_core::health::ServiceHealthCheck;
use warden_core::parse::ContainerState;
use warden_core::service::ServiceDefinition;

use crate::checks::ServiceChecker;
use crate::network::NetworkResolver;
use crate::runtime::ContainerRuntime;

/// Result of one batch start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    /// Every service a launch was attempted for, in order
    pub attempted: Vec<String>,
    /// Service name and error for each failed launch
    pub failures: Vec<(String, String)>,
}

impl StartReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// `PartialFailure` when any launch failed
    pub fn into_result(self) -> WardenResult<Self> {
        if self.succeeded() {
            Ok(self)
        } else {
            Err(WardenError::PartialFailure {
                operation: "start services".to_string(),
                failures: self.failures,
            })
        }
    }
}

/// Final state after start, settle, check and at most one repair pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartOutcome {
    pub report: StartReport,
    pub checks: Vec<ServiceHealthCheck>,
    /// Repair actions taken, empty when the first check passed
    pub repairs: Vec<String>,
}

impl StartOutcome {
    pub fn healthy(&self) -> bool {
        self.report.succeeded() && self.checks.iter().all(|c| c.healthy)
    }
}

/// Manages the catalogue's containers inside one distribution
pub struct ServiceOrchestrator {
    runtime: ContainerRuntime,
    checker: ServiceChecker,
    network: NetworkResolver,
    audit: Arc<dyn AuditSink>,
    config: Arc<WardenConfig>,
}

impl ServiceOrchestrator {
    pub fn new(
        runtime: ContainerRuntime,
        checker: ServiceChecker,
        network: NetworkResolver,
        audit: Arc<dyn AuditSink>,
        config: Arc<WardenConfig>,
    ) -> Self {
        Self {
            runtime,
            checker,
            network,
            audit,
            config,
        }
    }

    fn service(&self, name: &str) -> WardenResult<&ServiceDefinition> {
        self.config
            .service(name)
            .ok_or_else(|| WardenError::not_found(format!("service {} is not in the catalogue", name)))
    }

    /// Start every catalogue service. Prerequisite failures (runtime,
    /// network) are errors; individual launch failures are collected and
    /// every service is attempted.
    pub async fn start_all(&self, cancel: &CancellationToken) -> WardenResult<StartReport> {
        self.runtime.ensure_ready(cancel).await?;
        let networks: BTreeSet<&str> = self
            .config
            .services
            .iter()
            .map(|s| s.network(&self.config.network_name))
            .chain(std::iter::once(self.config.network_name.as_str()))
            .collect();
        for network in networks {
            self.runtime.ensure_network(network, cancel).await?;
        }

        let mut report = StartReport::default();
        for service in &self.config.services {
            if cancel.is_cancelled() {
                return Err(WardenError::cancelled("start services"));
            }
            report.attempted.push(service.name.clone());
            if let Err(e) = self.launch(service, cancel).await {
                warn!(service = %service.name, error = %e, "Service launch failed");
                report.failures.push((service.name.clone(), e.to_string()));
            }
        }

        info!(
            attempted = report.attempted.len(),
            failed = report.failures.len(),
            "Service batch start finished"
        );
        Ok(report)
    }

    /// Remove any stale container, then launch fresh
    async fn launch(&self, service: &ServiceDefinition, cancel: &CancellationToken) -> WardenResult<()> {
        self.runtime.remove(&service.name, cancel).await?;
        let result = self.runtime.run(service, &self.config.network_name, cancel).await;
        self.record(AuditEvent::from_result(AuditAction::StartService, service.name.as_str(), &result))
            .await;
        result
    }

    /// Start, wait the settle interval, check, repair once, check once more
    pub async fn start_and_verify(&self, cancel: &CancellationToken) -> WardenResult<StartOutcome> {
        let report = self.start_all(cancel).await?;
        self.pause(self.config.timeouts.settle(), cancel).await?;

        let checks = self.check(cancel).await;
        if checks.iter().all(|c| c.healthy) {
            return Ok(StartOutcome {
                report,
                checks,
                repairs: Vec::new(),
            });
        }

        let unhealthy: Vec<&str> = checks
            .iter()
            .filter(|c| !c.healthy)
            .map(|c| c.service_name.as_str())
            .collect();
        warn!(services = ?unhealthy, "Services unhealthy after start, attempting repair");

        let repairs = self.repair(cancel).await;
        if !repairs.is_empty() {
            self.pause(self.config.timeouts.settle(), cancel).await?;
        }
        let checks = self.check(cancel).await;
        Ok(StartOutcome {
            report,
            checks,
            repairs,
        })
    }

    /// One bounded repair pass: restart a dead daemon, relaunch missing
    /// containers, start stopped ones. A failed step is logged and recorded
    /// as a `failed: ...` action and the pass continues.
    pub async fn repair(&self, cancel: &CancellationToken) -> Vec<String> {
        let mut actions = Vec::new();
        let mut failed = false;

        match self.runtime.daemon_running(cancel).await {
            Ok(true) => {}
            Ok(false) => match self.runtime.start_daemon(cancel).await {
                Ok(()) => actions.push("restarted container runtime daemon".to_string()),
                Err(e) => {
                    warn!(error = %e, "Failed to restart container runtime daemon");
                    actions.push(format!("failed: restart container runtime daemon: {}", e));
                    failed = true;
                }
            },
            Err(e) => {
                warn!(error = %e, "Failed to query container runtime daemon");
                actions.push(format!("failed: query container runtime daemon: {}", e));
                failed = true;
            }
        }

        match self.runtime.list(cancel).await {
            Ok(containers) => {
                for service in &self.config.services {
                    let action = match containers.get(&service.name) {
                        Some(state) if state.is_running() => continue,
                        Some(_) => self
                            .runtime
                            .start(&service.name, cancel)
                            .await
                            .map(|_| format!("started stopped container {}", service.name)),
                        None => self
                            .launch(service, cancel)
                            .await
                            .map(|_| format!("relaunched missing container {}", service.name)),
                    };
                    match action {
                        Ok(action) => actions.push(action),
                        Err(e) => {
                            warn!(service = %service.name, error = %e, "Repair action failed");
                            actions.push(format!("failed: repair {}: {}", service.name, e));
                            failed = true;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list containers");
                actions.push(format!("failed: list containers: {}", e));
                failed = true;
            }
        }

        let outcome = if failed {
            AuditOutcome::Failed
        } else {
            AuditOutcome::Succeeded
        };
        self.record(
            AuditEvent::new(AuditAction::Repair, self.runtime.distribution(), outcome).with_details(actions.join("; ")),
        )
        .await;
        actions
    }

    /// Current health of every service
    pub async fn check(&self, cancel: &CancellationToken) -> Vec<ServiceHealthCheck> {
        let guest_ip = self.network.guest_ip(self.runtime.distribution(), cancel).await.ok();
        self.checker.check_all(guest_ip.as_deref(), cancel).await
    }

    pub async fn stop(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        self.service(name)?;
        let result = self.runtime.stop(name, cancel).await;
        self.record(AuditEvent::from_result(AuditAction::StopService, name, &result)).await;
        result
    }

    /// Start an existing container, launching it if it is missing
    pub async fn start(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        let service = self.service(name)?;
        match self.runtime.start(name, cancel).await {
            Err(WardenError::NotFound(_)) => {
                self.runtime
                    .ensure_network(service.network(&self.config.network_name), cancel)
                    .await?;
                self.launch(service, cancel).await
            }
            result => {
                self.record(AuditEvent::from_result(AuditAction::StartService, name, &result)).await;
                result
            }
        }
    }

    /// Stop, wait, start. A failed stop aborts without starting.
    pub async fn restart(&self, name: &str, cancel: &CancellationToken) -> WardenResult<()> {
        self.service(name)?;
        let result = async {
            self.runtime.stop(name, cancel).await?;
            self.pause(self.config.timeouts.restart_delay(), cancel).await?;
            self.start(name, cancel).await
        }
        .await;
        self.record(AuditEvent::from_result(AuditAction::RestartService, name, &result)).await;
        result
    }

    /// State of each catalogue container the runtime knows about
    pub async fn container_statuses(&self, cancel: &CancellationToken) -> WardenResult<BTreeMap<String, ContainerState>> {
        let mut containers = self.runtime.list(cancel).await?;
        containers.retain(|name, _| self.config.service(name).is_some());
        Ok(containers)
    }

    async fn pause(&self, duration: std::time::Duration, cancel: &CancellationToken) -> WardenResult<()> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = cancel.cancelled() => Err(WardenError::cancelled("wait")),
        }
    }

    async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "Failed to write audit event");
        }
    }
}
