use warden_core::audit::{AuditAction, AuditOutcome};
use warden_lifecycle::remediation::{INSTRUCTIONS_FILE, SCRIPT_FILE};
use warden_lifecycle::ReadyOutcome;

use crate::support::{FakeHost, Harness, DISTRO, IMAGE_BYTES};

#[tokio::test]
async fn test_cold_start_reaches_ready() {
    let h = Harness::new(FakeHost::empty());

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::Ready(report) = outcome else {
        panic!("expected ready, got {:?}", outcome);
    };
    assert_eq!(report.distribution.name, DISTRO);
    assert!(report.distribution.is_running());
    assert!(report.services.healthy());
    assert_eq!(report.services.report.attempted, vec!["vector-db", "tool-server"]);
    assert!(report.services.repairs.is_empty());

    assert_eq!(h.downloader.count(), 1);
    assert_eq!(h.host.count_calls("--import warden"), 1);
    assert!(h.host.with(|s| s.configured));
    assert!(h.host.with(|s| s.networks.contains("warden-net")));
}

#[tokio::test]
async fn test_concurrent_ensure_ready_imports_once() {
    let h = Harness::new(FakeHost::empty());

    let (a, b) = tokio::join!(h.lifecycle.ensure_ready(&h.cancel), h.lifecycle.ensure_ready(&h.cancel));

    assert!(a.is_ready(), "first caller: {:?}", a);
    assert!(b.is_ready(), "second caller: {:?}", b);
    assert_eq!(h.host.count_calls("--import"), 1);
    assert_eq!(h.downloader.count(), 1);
    assert_eq!(h.host.with(|s| s.distros.len()), 1);
}

#[tokio::test]
async fn test_ensure_ready_is_idempotent() {
    let h = Harness::new(FakeHost::empty());

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    let first_run = h.host.calls().len();
    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());

    assert_eq!(h.downloader.count(), 1);
    assert_eq!(h.host.count_calls("--import"), 1);
    assert_eq!(h.host.with(|s| s.distros.len()), 1);
    for call in &h.host.calls()[first_run..] {
        assert!(!call.contains("useradd"), "configured twice: {}", call);
        assert!(!call.contains("docker.io"), "runtime installed twice: {}", call);
    }
}

#[tokio::test]
async fn test_truncated_artifact_is_downloaded_again() {
    let h = Harness::new(FakeHost::empty());
    let image = h.image_path();
    std::fs::create_dir_all(image.parent().unwrap()).unwrap();
    std::fs::write(&image, vec![0u8; 500]).unwrap();

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());

    assert_eq!(h.downloader.count(), 1);
    assert_eq!(std::fs::metadata(&image).unwrap().len(), IMAGE_BYTES as u64);
}

#[tokio::test]
async fn test_valid_cached_artifact_is_reused() {
    let h = Harness::new(FakeHost::empty());
    let image = h.image_path();
    std::fs::create_dir_all(image.parent().unwrap()).unwrap();
    std::fs::write(&image, vec![0x1f; IMAGE_BYTES]).unwrap();

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    assert_eq!(h.downloader.count(), 0);
}

#[tokio::test]
async fn test_version_one_distribution_is_converted() {
    let host = FakeHost::provisioned();
    host.with(|s| s.distros[0].version = 1);
    let h = Harness::new(host);

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    assert_eq!(h.host.count_calls("--set-version warden 2"), 1);
    assert_eq!(h.host.with(|s| s.distros[0].version), 2);
}

#[tokio::test]
async fn test_stopped_distribution_is_booted() {
    let host = FakeHost::provisioned();
    host.set_distro_state("Stopped");
    let h = Harness::new(host);

    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    assert_eq!(h.downloader.count(), 0);
    assert_eq!(h.host.with(|s| s.distros[0].state.clone()), "Running");
}

#[tokio::test]
async fn test_permission_denied_writes_remediation_bundle() {
    let host = FakeHost::default();
    host.with(|s| s.install_needs_elevation = true);
    let h = Harness::new(host);

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::NeedsElevation(bundle) = outcome else {
        panic!("expected elevation request, got {:?}", outcome);
    };
    assert!(bundle.instructions_path.ends_with(INSTRUCTIONS_FILE));
    assert!(bundle.script_path.ends_with(SCRIPT_FILE));

    let script = std::fs::read_to_string(&bundle.script_path).unwrap();
    assert!(script.contains("Microsoft-Windows-Subsystem-Linux"));
    assert!(script.contains("VirtualMachinePlatform"));
    assert!(std::fs::read_to_string(&bundle.instructions_path).unwrap().contains(DISTRO));

    assert_eq!(h.downloader.count(), 0);
    let events = h.audit.events().await;
    assert!(events
        .iter()
        .any(|e| e.action == AuditAction::InstallSubsystem && e.outcome == AuditOutcome::Failed));
}

#[tokio::test]
async fn test_provisioning_is_audited() {
    let h = Harness::new(FakeHost::empty());
    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());

    let actions: Vec<AuditAction> = h.audit.events().await.iter().map(|e| e.action).collect();
    for expected in [AuditAction::Download, AuditAction::Import, AuditAction::Configure, AuditAction::StartService] {
        assert!(actions.contains(&expected), "missing {:?} in {:?}", expected, actions);
    }
}

#[tokio::test]
async fn test_import_timeout_is_audited() {
    let host = FakeHost::empty();
    host.with(|s| s.import_times_out = true);
    let h = Harness::new(host);

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    let ReadyOutcome::Failed { reason } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(reason.contains("--import"), "{}", reason);

    let events = h.audit.events().await;
    let import = events.iter().find(|e| e.action == AuditAction::Import).unwrap();
    assert_eq!(import.outcome, AuditOutcome::Failed);
    assert_eq!(import.target, DISTRO);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = Harness::new(FakeHost::empty());
    h.cancel.cancel();

    let outcome = h.lifecycle.ensure_ready(&h.cancel).await;
    assert!(!outcome.is_ready());
    assert_eq!(h.downloader.count(), 0);
}

#[tokio::test]
async fn test_export_and_unregister() {
    let h = Harness::new(FakeHost::provisioned());
    let dest = h.dir.path().join("backup").join("warden.tar");

    h.lifecycle.export_distribution(&dest, &h.cancel).await.unwrap();
    assert!(dest.exists());

    h.lifecycle.unregister_distribution(&h.cancel).await.unwrap();
    assert!(h.host.with(|s| s.distros.is_empty()));
    assert!(h.lifecycle.unregister_distribution(&h.cancel).await.unwrap_err().is_not_found());
}
