use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of probing one service once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthCheck {
    pub service_name: String,
    pub healthy: bool,
    pub details: String,
    pub response_time_ms: u64,
    pub port: Option<u16>,
    pub memory_usage_bytes: Option<u64>,
}

/// Aggregate verdict of one health-check pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateHealthResult {
    pub healthy: bool,
    pub environment_ready: bool,
    pub distribution_running: bool,
    pub all_services_healthy: bool,
    pub network_connected: bool,
    pub per_service_checks: Vec<ServiceHealthCheck>,
    /// Negative findings, most fundamental first
    pub issues: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Accumulates findings in priority order and folds them into a result
#[derive(Debug, Default)]
pub struct HealthReportBuilder {
    environment_ready: bool,
    distribution_running: bool,
    network_connected: bool,
    checks: Vec<ServiceHealthCheck>,
    services_checked: bool,
    environment_issues: Vec<String>,
    distribution_issues: Vec<String>,
    network_issues: Vec<String>,
}

impl HealthReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn environment(mut self, ready: bool, message: &str) -> Self {
        self.environment_ready = ready;
        if !ready && !message.is_empty() {
            self.environment_issues.push(message.to_string());
        }
        self
    }

    pub fn distribution(mut self, running: bool, issue: Option<String>) -> Self {
        self.distribution_running = running;
        self.distribution_issues.extend(issue);
        self
    }

    pub fn network(mut self, connected: bool, issue: Option<String>) -> Self {
        self.network_connected = connected;
        self.network_issues.extend(issue);
        self
    }

    pub fn services(mut self, checks: Vec<ServiceHealthCheck>) -> Self {
        self.checks = checks;
        self.services_checked = true;
        self
    }

    /// Fold everything into the final result. Every false flag contributes
    /// at least one issue.
    pub fn build(self, started_at: std::time::Instant) -> AggregateHealthResult {
        let all_services_healthy = self.services_checked && self.checks.iter().all(|c| c.healthy);

        let mut issues = self.environment_issues;
        if !self.environment_ready && issues.is_empty() {
            issues.push("Environment is not ready".to_string());
        }

        let distribution_issue_count = self.distribution_issues.len();
        issues.extend(self.distribution_issues);
        if !self.distribution_running && distribution_issue_count == 0 {
            issues.push("Distribution is not running".to_string());
        }

        let network_issue_count = self.network_issues.len();
        issues.extend(self.network_issues);
        if !self.network_connected && network_issue_count == 0 {
            issues.push("Network connectivity to the guest is not established".to_string());
        }

        if !self.services_checked {
            issues.push("Services were not checked".to_string());
        } else {
            issues.extend(
                self.checks
                    .iter()
                    .filter(|c| !c.healthy)
                    .map(|c| format!("Service '{}' is unhealthy: {}", c.service_name, c.details)),
            );
        }

        let healthy = self.environment_ready
            && self.distribution_running
            && all_services_healthy
            && self.network_connected;

        AggregateHealthResult {
            healthy,
            environment_ready: self.environment_ready,
            distribution_running: self.distribution_running,
            all_services_healthy,
            network_connected: self.network_connected,
            per_service_checks: self.checks,
            issues,
            timestamp: Utc::now(),
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        }
    }
}
