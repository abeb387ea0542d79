use warden_core::status::DistributionState;

use crate::support::{FakeHost, Harness, DISTRO};

#[tokio::test]
async fn test_status_when_subsystem_missing() {
    let host = FakeHost::default();
    let h = Harness::new(host);

    let status = h.lifecycle.status(&h.cancel).await;
    assert!(!status.installed);
    assert!(!status.ready);
    assert!(status.distributions.is_empty());
    assert!(status.message.contains("not installed"));
}

#[tokio::test]
async fn test_status_survives_timeout() {
    let host = FakeHost::empty();
    host.with(|s| s.version_times_out = true);
    let h = Harness::new(host);

    let status = h.lifecycle.status(&h.cancel).await;
    assert!(!status.installed);
    assert!(status.message.contains("timed out") || status.message.contains("not responding"));
}

#[tokio::test]
async fn test_status_empty_host() {
    let h = Harness::new(FakeHost::empty());

    let status = h.lifecycle.status(&h.cancel).await;
    assert!(status.installed);
    assert_eq!(status.subsystem_version, "2.0.14.0");
    assert_eq!(status.kernel_version, "5.15.133.1-1");
    assert!(status.is_target_version);
    assert!(!status.has_required_distribution);
    assert!(!status.ready);
    assert!(status.required_host_features_enabled.values().all(|enabled| *enabled));
}

#[tokio::test]
async fn test_status_provisioned() {
    let h = Harness::new(FakeHost::provisioned());

    let status = h.lifecycle.status(&h.cancel).await;
    assert!(status.ready, "{}", status.message);
    let record = status.distribution(DISTRO).unwrap();
    assert_eq!(record.state, DistributionState::Running);
    assert!(record.is_default);
    assert_eq!(record.version, "2");
}

#[tokio::test]
async fn test_status_is_read_only() {
    let h = Harness::new(FakeHost::provisioned());
    h.lifecycle.status(&h.cancel).await;

    for call in h.host.calls() {
        assert!(
            !call.contains("--import") && !call.contains("--terminate") && !call.contains(" -d "),
            "status issued a mutating command: {}",
            call
        );
    }
}

#[tokio::test]
async fn test_out_of_band_stop_is_not_cached() {
    let h = Harness::new(FakeHost::provisioned());
    assert!(h.lifecycle.ensure_ready(&h.cancel).await.is_ready());
    let before = h.lifecycle.status(&h.cancel).await;
    assert_eq!(before.distribution(DISTRO).unwrap().state, DistributionState::Running);

    h.host.set_distro_state("Stopped");

    let after = h.lifecycle.status(&h.cancel).await;
    assert_eq!(after.distribution(DISTRO).unwrap().state, DistributionState::Stopped);
    assert!(!after.ready);
}
