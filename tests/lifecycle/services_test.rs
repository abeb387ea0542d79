use warden_core::audit::{AuditAction, AuditOutcome};
use warden_core::parse::ContainerState;
use warden_lifecycle::ReadyOutcome;

use crate::support::{FakeHost, Harness};

#[tokio::test]
async fn test_partial_failure_attempts_every_service() {
    let host = FakeHost::provisioned();
    host.with(|s| {
        s.failing_launches.insert("tool-server".to_string());
    });
    let h = Harness::new(host);

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::Degraded(report) = outcome else {
        panic!("expected degraded, got {:?}", outcome);
    };
    let start = &report.services.report;
    assert_eq!(start.attempted.len(), 2);
    assert_eq!(start.failures.len(), 1);
    assert_eq!(start.failures[0].0, "tool-server");

    let containers = h.lifecycle.container_statuses(&h.cancel).await.unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers.get("vector-db"), Some(&ContainerState::Running));

    assert!(!h.lifecycle.start_all_services(&h.cancel).await);
}

#[tokio::test]
async fn test_out_of_band_stop_is_reported() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());

    h.host.set_container_status("tool-server", "Exited (137) 5 seconds ago");

    let containers = h.lifecycle.container_statuses(&h.cancel).await.unwrap();
    assert_eq!(containers.get("tool-server"), Some(&ContainerState::Exited));
    assert_eq!(containers.get("vector-db"), Some(&ContainerState::Running));

    let health = h.lifecycle.health_check(&h.cancel).await;
    assert!(!health.healthy);
    assert!(!health.all_services_healthy);
    assert!(health.issues.iter().any(|i| i.contains("tool-server")));
}

#[tokio::test]
async fn test_stop_start_restart() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.start_all_services(&h.cancel).await);

    assert!(h.lifecycle.stop_service("vector-db", &h.cancel).await);
    let containers = h.lifecycle.container_statuses(&h.cancel).await.unwrap();
    assert_eq!(containers.get("vector-db"), Some(&ContainerState::Exited));

    assert!(h.lifecycle.start_service("vector-db", &h.cancel).await);
    assert!(h.lifecycle.restart_service("vector-db", &h.cancel).await);
    let containers = h.lifecycle.container_statuses(&h.cancel).await.unwrap();
    assert_eq!(containers.get("vector-db"), Some(&ContainerState::Running));
    assert_eq!(h.host.count_calls("docker stop vector-db"), 2);
}

#[tokio::test]
async fn test_unknown_service_is_rejected() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(!h.lifecycle.stop_service("mail-relay", &h.cancel).await);
    assert!(!h.lifecycle.start_service("mail-relay", &h.cancel).await);
    assert_eq!(h.host.count_calls("mail-relay"), 0);
}

#[tokio::test]
async fn test_start_relaunches_missing_container() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.start_all_services(&h.cancel).await);

    h.host.with(|s| s.containers.remove("tool-server"));
    assert!(h.lifecycle.start_service("tool-server", &h.cancel).await);

    let containers = h.lifecycle.container_statuses(&h.cancel).await.unwrap();
    assert_eq!(containers.get("tool-server"), Some(&ContainerState::Running));
    assert_eq!(h.host.count_calls("docker run -d --name tool-server"), 2);
}

#[tokio::test]
async fn test_restart_of_missing_container_fails_without_start() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(!h.lifecycle.restart_service("vector-db", &h.cancel).await);
    assert_eq!(h.host.count_calls("docker start vector-db"), 0);
}

#[tokio::test]
async fn test_repair_runs_at_most_once() {
    let h = Harness::new(FakeHost::provisioned());
    h.http.respond(":6333", 503);

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::Degraded(report) = outcome else {
        panic!("expected degraded, got {:?}", outcome);
    };
    assert!(report.services.repairs.is_empty());
    assert_eq!(h.host.count_calls("docker run -d --name vector-db"), 1);
    let vector_db = report
        .services
        .checks
        .iter()
        .find(|c| c.service_name == "vector-db")
        .unwrap();
    assert!(!vector_db.healthy);
    assert!(vector_db.details.contains("503"));
}

#[tokio::test]
async fn test_dead_daemon_is_restarted() {
    let h = Harness::new(FakeHost::provisioned());
    h.host.with(|s| s.daemon_running = false);

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    assert!(h.host.with(|s| s.daemon_running));
}

#[tokio::test]
async fn test_service_network_override_is_created() {
    let h = Harness::with_config(FakeHost::provisioned(), |config| {
        config.services[0].network_name = Some("custom-net".to_string());
    });

    assert!(h.lifecycle.start_all_services(&h.cancel).await);
    assert_eq!(h.host.count_calls("docker network create custom-net"), 1);
    assert_eq!(h.host.count_calls("docker network create warden-net"), 1);
    assert_eq!(h.host.count_calls("--network custom-net"), 1);

    h.host.with(|s| {
        s.containers.remove("vector-db");
        s.networks.remove("custom-net");
    });
    assert!(h.lifecycle.start_service("vector-db", &h.cancel).await);
    assert!(h.host.with(|s| s.networks.contains("custom-net")));
}

#[tokio::test]
async fn test_failed_repair_still_rechecks() {
    let host = FakeHost::provisioned();
    host.with(|s| {
        s.daemon_start_fails = true;
        s.daemon_crashes_on = Some("tool-server".to_string());
    });
    let h = Harness::new(host);

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::Degraded(report) = outcome else {
        panic!("expected degraded, got {:?}", outcome);
    };
    assert!(report.services.report.succeeded());
    assert_eq!(report.services.checks.len(), 2);
    assert!(report.services.checks.iter().all(|c| !c.healthy));
    assert!(report.services.repairs.iter().all(|r| r.starts_with("failed:")));
    assert_eq!(report.services.repairs.len(), 2);
    assert_eq!(h.host.count_calls("start docker"), 1);

    let events = h.audit.events().await;
    let repair = events.iter().find(|e| e.action == AuditAction::Repair).unwrap();
    assert_eq!(repair.outcome, AuditOutcome::Failed);
}
