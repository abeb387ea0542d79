//! Per-service health checks, shared by the orchestrator's repair loop and
//! the health monitor.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use warden_core::health::ServiceHealthCheck;
use warden_core::parse::ContainerState;
use warden_core::service::{HealthProbe, ServiceDefinition};

use crate::probe::{status_is_reachable, HttpProbe};
use crate::runtime::ContainerRuntime;

/// Probes every catalogue service once
#[derive(Clone)]
pub struct ServiceChecker {
    runtime: ContainerRuntime,
    http: Arc<dyn HttpProbe>,
    services: Vec<ServiceDefinition>,
    probe_timeout: Duration,
}

impl ServiceChecker {
    pub fn new(
        runtime: ContainerRuntime,
        http: Arc<dyn HttpProbe>,
        services: Vec<ServiceDefinition>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            http,
            services,
            probe_timeout,
        }
    }

    pub fn services(&self) -> &[ServiceDefinition] {
        &self.services
    }

    /// One check per declared service, in catalogue order. Read-only.
    pub async fn check_all(&self, guest_ip: Option<&str>, cancel: &CancellationToken) -> Vec<ServiceHealthCheck> {
        let containers = match self.runtime.list(cancel).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "Container runtime unavailable");
                let details = format!("container runtime unavailable: {}", e);
                return self
                    .services
                    .iter()
                    .map(|s| unhealthy(s, details.clone(), Duration::ZERO))
                    .collect();
            }
        };
        let memory = self.runtime.memory_stats(cancel).await.unwrap_or_else(|e| {
            debug!(error = %e, "Container statistics unavailable");
            BTreeMap::new()
        });

        let checks = self
            .services
            .iter()
            .map(|service| self.check_one(service, containers.get(&service.name), guest_ip, cancel));
        let mut results = join_all(checks).await;
        for check in results.iter_mut() {
            check.memory_usage_bytes = memory.get(&check.service_name).copied();
        }
        results
    }

    async fn check_one(
        &self,
        service: &ServiceDefinition,
        state: Option<&ContainerState>,
        guest_ip: Option<&str>,
        cancel: &CancellationToken,
    ) -> ServiceHealthCheck {
        let started = Instant::now();
        match state {
            None => return unhealthy(service, "container not found".to_string(), started.elapsed()),
            Some(state) if !state.is_running() => {
                return unhealthy(service, format!("container is {:?}", state), started.elapsed())
            }
            Some(_) => {}
        }

        match &service.probe {
            HealthProbe::Http { path, accept_unauthorized } => {
                let (Some(ip), Some(port)) = (guest_ip, service.primary_port()) else {
                    return unhealthy(service, "guest address unknown".to_string(), started.elapsed());
                };
                let url = format!("http://{}:{}{}", ip, port, path);
                match self.http.get_status(&url, self.probe_timeout).await {
                    Ok(status) if status_is_reachable(status, *accept_unauthorized) => {
                        healthy(service, format!("HTTP {} from {}", status, url), started.elapsed())
                    }
                    Ok(status) => unhealthy(service, format!("HTTP {} from {}", status, url), started.elapsed()),
                    Err(e) => unhealthy(service, format!("{} unreachable: {}", url, e), started.elapsed()),
                }
            }
            HealthProbe::Runtime => match self.runtime.health_status(&service.name, cancel).await {
                Ok(Some(status)) if status == "healthy" => {
                    healthy(service, "container reports healthy".to_string(), started.elapsed())
                }
                Ok(Some(status)) => unhealthy(service, format!("container reports {}", status), started.elapsed()),
                Ok(None) => healthy(service, "running, no health check declared".to_string(), started.elapsed()),
                Err(e) => unhealthy(service, e.to_string(), started.elapsed()),
            },
        }
    }
}

fn healthy(service: &ServiceDefinition, details: String, elapsed: Duration) -> ServiceHealthCheck {
    check(service, true, details, elapsed)
}

fn unhealthy(service: &ServiceDefinition, details: String, elapsed: Duration) -> ServiceHealthCheck {
    check(service, false, details, elapsed)
}

fn check(service: &ServiceDefinition, healthy: bool, details: String, elapsed: Duration) -> ServiceHealthCheck {
    ServiceHealthCheck {
        service_name: service.name.clone(),
        healthy,
        details,
        response_time_ms: elapsed.as_millis() as u64,
        port: service.primary_port(),
        memory_usage_bytes: None,
    }
}
