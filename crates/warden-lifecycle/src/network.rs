//! Guest and host address discovery.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use warden_core::config::WardenConfig;
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::argv;
use warden_core::network::{service_endpoints, NetworkInfo};
use warden_core::parse;

use crate::host::{WslHost, IPCONFIG_EXE};
use crate::probe::ConnectivityProbe;

/// Adapter-name marker of the host side of the guest's virtual switch
const HOST_ADAPTER_MARKER: &str = "WSL";

/// Resolves addresses on both sides of the virtual network
#[derive(Clone)]
pub struct NetworkResolver {
    host: WslHost,
    connectivity: Arc<dyn ConnectivityProbe>,
    config: Arc<WardenConfig>,
}

impl NetworkResolver {
    pub fn new(host: WslHost, connectivity: Arc<dyn ConnectivityProbe>, config: Arc<WardenConfig>) -> Self {
        Self {
            host,
            connectivity,
            config,
        }
    }

    /// Resolve the network view of `distribution`. The three lookups are
    /// independent; each failure is collected into `error` and the rest of
    /// the structure is still filled in.
    pub async fn get_network_info(&self, distribution: &str, cancel: &CancellationToken) -> NetworkInfo {
        let (guest_ip, gateway, adapter) = tokio::join!(
            self.guest_ip(distribution, cancel),
            self.host_ip_from_guest(distribution, cancel),
            self.host_adapter(cancel),
        );

        let mut errors = Vec::new();
        let mut info = NetworkInfo {
            distribution_name: distribution.to_string(),
            ..NetworkInfo::default()
        };

        match guest_ip {
            Ok(ip) => info.internal_ip_address = Some(ip),
            Err(e) => errors.push(format!("guest address: {}", e)),
        }
        match gateway {
            Ok(ip) => info.host_ip_as_seen_from_guest = Some(ip),
            Err(e) => errors.push(format!("default gateway: {}", e)),
        }
        match adapter {
            Ok((name, address)) => {
                info.host_side_interface_name = Some(name);
                info.host_side_interface_address = address;
            }
            Err(e) => errors.push(format!("host adapter: {}", e)),
        }

        info.service_endpoints = service_endpoints(info.internal_ip_address.as_deref(), &self.config.services);

        if let Some(ip) = info.internal_ip_address.clone() {
            match self.check_connectivity(&ip).await {
                Ok(latency_ms) => {
                    info.connected = true;
                    info.latency_ms = Some(latency_ms);
                }
                Err(e) => errors.push(format!("connectivity: {}", e)),
            }
        }

        if !errors.is_empty() {
            debug!(distribution, errors = ?errors, "Network lookup incomplete");
            info.error = Some(errors.join("; "));
        }
        info
    }

    /// Guest address on its primary interface
    pub async fn guest_ip(&self, distribution: &str, cancel: &CancellationToken) -> WardenResult<String> {
        let timeout = self.host.command_timeout();
        let result = self
            .host
            .guest(distribution, None, &argv(["ip", "-4", "-o", "addr", "show", "dev", "eth0"]), timeout, cancel)
            .await?;
        if result.success() {
            if let Some(ip) = parse::parse_guest_ip(&result.stdout) {
                return Ok(ip);
            }
        }

        let result = self
            .host
            .guest(distribution, None, &argv(["hostname", "-I"]), timeout, cancel)
            .await?;
        if result.success() {
            if let Some(ip) = parse::parse_guest_ip(&result.stdout) {
                return Ok(ip);
            }
        }
        Err(WardenError::not_found(format!("no IPv4 address reported by {}", distribution)))
    }

    /// Host address as the guest sees it: the guest's default gateway
    async fn host_ip_from_guest(&self, distribution: &str, cancel: &CancellationToken) -> WardenResult<String> {
        let result = self
            .host
            .guest_ok(
                distribution,
                None,
                &argv(["ip", "route", "show", "default"]),
                self.host.command_timeout(),
                cancel,
            )
            .await?;
        parse::parse_default_gateway(&result.stdout)
            .ok_or_else(|| WardenError::not_found(format!("no default route in {}", distribution)))
    }

    async fn host_adapter(&self, cancel: &CancellationToken) -> WardenResult<(String, Option<String>)> {
        let result = self.host.host_tool(IPCONFIG_EXE, &[], cancel).await?;
        if !result.success() {
            return Err(WardenError::command(IPCONFIG_EXE, result.error_text()));
        }
        parse::parse_host_adapter(&result.stdout, HOST_ADAPTER_MARKER)
            .ok_or_else(|| WardenError::not_found("no virtual adapter on the host"))
    }

    /// TCP probe to the first declared service port
    async fn check_connectivity(&self, ip: &str) -> WardenResult<u64> {
        let port = self
            .config
            .services
            .iter()
            .find_map(|s| s.primary_port())
            .ok_or_else(|| WardenError::not_found("no service declares a port to probe"))?;
        let elapsed = self
            .connectivity
            .connect(ip, port, self.config.timeouts.probe())
            .await?;
        Ok(elapsed.as_millis() as u64)
    }
}
