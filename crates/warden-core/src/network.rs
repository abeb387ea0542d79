use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::service::ServiceDefinition;

/// Network view of one distribution, recomputed on every call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub distribution_name: String,
    /// Guest address on its primary interface
    pub internal_ip_address: Option<String>,
    /// Host address as the guest sees it (default gateway)
    pub host_ip_as_seen_from_guest: Option<String>,
    /// Host-side virtual adapter name
    pub host_side_interface_name: Option<String>,
    /// Host-side virtual adapter address
    pub host_side_interface_address: Option<String>,
    /// Service name to reachable URL
    pub service_endpoints: BTreeMap<String, String>,
    /// A TCP probe to a well-known service port succeeded
    pub connected: bool,
    pub latency_ms: Option<u64>,
    /// Collected lookup failures, if any
    pub error: Option<String>,
}

/// Build `http://{ip}:{port}` endpoints for every service with a port
pub fn service_endpoints(
    guest_ip: Option<&str>,
    services: &[ServiceDefinition],
) -> BTreeMap<String, String> {
    let Some(ip) = guest_ip else {
        return BTreeMap::new();
    };

    services
        .iter()
        .filter_map(|service| {
            service
                .primary_port()
                .map(|port| (service.name.clone(), format!("http://{}:{}", ip, port)))
        })
        .collect()
}
