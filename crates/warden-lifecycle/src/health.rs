//! Aggregate health verdict.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use warden_core::config::WardenConfig;
use warden_core::health::{AggregateHealthResult, HealthReportBuilder};

use crate::checks::ServiceChecker;
use crate::network::NetworkResolver;
use crate::status::StatusProber;

/// Composes status, network and per-service checks. Never mutates anything.
#[derive(Clone)]
pub struct HealthMonitor {
    prober: StatusProber,
    network: NetworkResolver,
    checker: ServiceChecker,
    config: Arc<WardenConfig>,
}

impl HealthMonitor {
    pub fn new(
        prober: StatusProber,
        network: NetworkResolver,
        checker: ServiceChecker,
        config: Arc<WardenConfig>,
    ) -> Self {
        Self {
            prober,
            network,
            checker,
            config,
        }
    }

    pub async fn health_check(&self, cancel: &CancellationToken) -> AggregateHealthResult {
        let started = Instant::now();
        let name = &self.config.distribution.name;

        let status = self.prober.get_status(cancel).await;
        let builder = HealthReportBuilder::new().environment(status.ready, &status.message);

        let running = status.distribution(name).map(|d| d.is_running()).unwrap_or(false);
        if !running {
            let issue = match status.distribution(name) {
                Some(record) => format!("Distribution '{}' is {}", name, record.state),
                None => format!("Distribution '{}' is not installed", name),
            };
            debug!(distribution = %name, "Distribution not running, skipping network and service checks");
            return builder
                .distribution(false, Some(issue))
                .network(false, Some("Network was not checked".to_string()))
                .build(started);
        }

        let info = self.network.get_network_info(name, cancel).await;
        let network_issue = if info.connected {
            None
        } else {
            Some(match &info.error {
                Some(error) => format!("Guest network is not reachable: {}", error),
                None => "Guest network is not reachable".to_string(),
            })
        };

        let checks = self
            .checker
            .check_all(info.internal_ip_address.as_deref(), cancel)
            .await;

        builder
            .distribution(true, None)
            .network(info.connected, network_issue)
            .services(checks)
            .build(started)
    }
}
