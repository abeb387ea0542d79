//! Output formatting utilities for CLI

use std::collections::BTreeMap;

use console::style;
use serde::Serialize;

use warden_core::health::AggregateHealthResult;
use warden_core::network::NetworkInfo;
use warden_core::parse::ContainerState;
use warden_core::status::EnvironmentStatus;

/// Format an error message
pub fn format_error(msg: &str) -> String {
    style(format!("Error: {}", msg)).red().to_string()
}

/// Format a success message
pub fn format_success(msg: &str) -> String {
    style(format!("Success: {}", msg)).green().to_string()
}

/// Format a warning message
pub fn format_warning(msg: &str) -> String {
    style(format!("Warning: {}", msg)).yellow().to_string()
}

/// Format an info message
pub fn format_info(msg: &str) -> String {
    style(msg).blue().to_string()
}

fn flag(value: bool) -> String {
    if value {
        style("yes").green().to_string()
    } else {
        style("no").red().to_string()
    }
}

/// Pretty JSON for `--json`
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn format_status(status: &EnvironmentStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!("WSL installed:     {}\n", flag(status.installed)));
    out.push_str(&format!("WSL version:       {}\n", status.subsystem_version));
    out.push_str(&format!("Kernel version:    {}\n", status.kernel_version));
    out.push_str(&format!("Target version:    {}\n", flag(status.is_target_version)));
    for (feature, enabled) in &status.required_host_features_enabled {
        out.push_str(&format!("Feature {}: {}\n", feature, flag(*enabled)));
    }

    if status.distributions.is_empty() {
        out.push_str("Distributions:     none\n");
    } else {
        out.push_str("Distributions:\n");
        for d in &status.distributions {
            let marker = if d.is_default { "*" } else { " " };
            out.push_str(&format!(
                "  {} {:<24} {:<12} v{}\n",
                marker,
                d.name,
                d.state.to_string(),
                d.version
            ));
        }
    }

    let message = if status.ready {
        style(&status.message).green()
    } else {
        style(&status.message).yellow()
    };
    out.push_str(&format!("Status:            {}\n", message));
    out
}

pub fn format_health(health: &AggregateHealthResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Environment ready:    {}\n", flag(health.environment_ready)));
    out.push_str(&format!("Distribution running: {}\n", flag(health.distribution_running)));
    out.push_str(&format!("Network connected:    {}\n", flag(health.network_connected)));
    out.push_str(&format!("Services healthy:     {}\n", flag(health.all_services_healthy)));

    for check in &health.per_service_checks {
        let mark = if check.healthy {
            style("ok").green()
        } else {
            style("FAIL").red()
        };
        let memory = check
            .memory_usage_bytes
            .map(|b| format!(" {:.1} MiB", b as f64 / (1024.0 * 1024.0)))
            .unwrap_or_default();
        out.push_str(&format!(
            "  [{}] {:<14} {} ({} ms{})\n",
            mark, check.service_name, check.details, check.response_time_ms, memory
        ));
    }

    if !health.issues.is_empty() {
        out.push_str("Issues:\n");
        for issue in &health.issues {
            out.push_str(&format!("  - {}\n", style(issue).yellow()));
        }
    }
    out.push_str(&format!("Checked in {} ms\n", health.elapsed_ms));
    out
}

pub fn format_network(info: &NetworkInfo) -> String {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let mut out = String::new();
    out.push_str(&format!("Distribution:    {}\n", info.distribution_name));
    out.push_str(&format!("Guest address:   {}\n", show(&info.internal_ip_address)));
    out.push_str(&format!("Host from guest: {}\n", show(&info.host_ip_as_seen_from_guest)));
    out.push_str(&format!(
        "Host adapter:    {} {}\n",
        show(&info.host_side_interface_name),
        show(&info.host_side_interface_address)
    ));
    let latency = info
        .latency_ms
        .map(|ms| format!(" ({} ms)", ms))
        .unwrap_or_default();
    out.push_str(&format!("Connected:       {}{}\n", flag(info.connected), latency));
    for (name, url) in &info.service_endpoints {
        out.push_str(&format!("  {:<14} {}\n", name, style(url).cyan()));
    }
    if let Some(error) = &info.error {
        out.push_str(&format_warning(error));
        out.push('\n');
    }
    out
}

pub fn format_containers(containers: &BTreeMap<String, ContainerState>) -> String {
    if containers.is_empty() {
        return "No managed containers\n".to_string();
    }
    let mut out = String::new();
    for (name, state) in containers {
        let state = match state {
            ContainerState::Running => style("running".to_string()).green(),
            ContainerState::Other(text) => style(text.clone()).yellow(),
            other => style(format!("{:?}", other).to_lowercase()).yellow(),
        };
        out.push_str(&format!("{:<14} {}\n", name, state));
    }
    out
}
