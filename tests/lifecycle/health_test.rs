use crate::support::{FakeHost, Harness, GUEST_IP};

#[tokio::test]
async fn test_healthy_environment() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());

    let health = h.lifecycle.health_check(&h.cancel).await;
    assert!(health.healthy, "{:?}", health.issues);
    assert!(health.environment_ready);
    assert!(health.distribution_running);
    assert!(health.network_connected);
    assert!(health.issues.is_empty());
    assert_eq!(health.per_service_checks.len(), 2);
    assert!(health
        .per_service_checks
        .iter()
        .all(|c| c.memory_usage_bytes == Some(100 * 1024 * 1024)));
}

#[tokio::test]
async fn test_stopped_distribution_skips_service_checks() {
    let h = Harness::new(FakeHost::provisioned());
    h.host.set_distro_state("Stopped");

    let health = h.lifecycle.health_check(&h.cancel).await;
    assert!(!health.healthy);
    assert!(!health.distribution_running);
    assert!(!health.all_services_healthy);
    assert!(health.per_service_checks.is_empty());
    assert!(health.issues.iter().any(|i| i == "Services were not checked"));
    assert!(health.issues.iter().any(|i| i == "Network was not checked"));
    assert_eq!(h.host.count_calls("docker"), 0);
    assert_eq!(h.host.with(|s| s.distros[0].state.clone()), "Stopped");
}

#[tokio::test]
async fn test_missing_subsystem_is_unhealthy() {
    let h = Harness::new(FakeHost::default());

    let health = h.lifecycle.health_check(&h.cancel).await;
    assert!(!health.healthy);
    assert!(!health.environment_ready);
    assert!(health.issues.iter().any(|i| i.contains("not installed")));
}

#[tokio::test]
async fn test_unreachable_network() {
    let h = Harness::with_connectivity(FakeHost::provisioned(), false);
    assert!(h.lifecycle.start_all_services(&h.cancel).await);

    let health = h.lifecycle.health_check(&h.cancel).await;
    assert!(!health.healthy);
    assert!(!health.network_connected);
    assert!(health.all_services_healthy);
    assert!(health.issues.iter().any(|i| i.starts_with("Guest network is not reachable")));
}

#[tokio::test]
async fn test_unauthorized_probe_is_unhealthy_by_default() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.start_all_services(&h.cancel).await);
    h.http.respond("/healthz", 401);

    let health = h.lifecycle.health_check(&h.cancel).await;
    let check = health
        .per_service_checks
        .iter()
        .find(|c| c.service_name == "vector-db")
        .unwrap();
    assert!(!check.healthy);
    assert!(check.details.contains("401"));
}

#[tokio::test]
async fn test_network_info() {
    let h = Harness::new(FakeHost::provisioned());

    let info = h.lifecycle.network_info(&h.cancel).await;
    assert_eq!(info.distribution_name, "warden");
    assert_eq!(info.internal_ip_address.as_deref(), Some(GUEST_IP));
    assert_eq!(info.host_ip_as_seen_from_guest.as_deref(), Some("172.28.0.1"));
    assert_eq!(info.host_side_interface_name.as_deref(), Some("vEthernet (WSL)"));
    assert_eq!(info.host_side_interface_address.as_deref(), Some("172.28.0.1"));
    assert_eq!(info.service_endpoints.get("vector-db").unwrap(), "http://172.28.1.5:6333");
    assert_eq!(info.service_endpoints.get("tool-server").unwrap(), "http://172.28.1.5:8080");
    assert!(info.connected);
    assert_eq!(info.latency_ms, Some(3));
    assert!(info.error.is_none());
}

#[tokio::test]
async fn test_network_info_without_distribution() {
    let h = Harness::new(FakeHost::empty());

    let info = h.lifecycle.network_info(&h.cancel).await;
    assert!(info.internal_ip_address.is_none());
    assert!(info.service_endpoints.is_empty());
    assert!(!info.connected);
    assert!(info.error.as_deref().unwrap().contains("guest address"));
}
