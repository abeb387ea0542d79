use warden_core::audit::AuditAction;

use crate::support::{FakeHost, Harness};

#[tokio::test]
async fn test_sync_prefers_rsync() {
    let h = Harness::new(FakeHost::provisioned());
    let source = tempfile::tempdir().unwrap();
    std::fs::write(source.path().join("notes.md"), "case notes").unwrap();

    assert!(h.lifecycle.sync_files(source.path(), "/home/analyst/work", &h.cancel).await);

    let expected = format!("rsync -a {}/ /home/analyst/work/", source.path().display());
    assert_eq!(h.host.count_calls(&expected), 1);
    assert_eq!(h.host.count_calls("-u analyst"), 2);
    assert!(h
        .audit
        .events()
        .await
        .iter()
        .any(|e| e.action == AuditAction::SyncFiles && e.target == "/home/analyst/work"));
}

#[tokio::test]
async fn test_sync_falls_back_to_copy() {
    let host = FakeHost::provisioned();
    host.with(|s| s.rsync_available = false);
    let h = Harness::new(host);
    let source = tempfile::tempdir().unwrap();

    assert!(h.lifecycle.sync_files(source.path(), "/srv/data", &h.cancel).await);
    assert_eq!(h.host.count_calls("mkdir -p /srv/data/"), 1);
    assert_eq!(h.host.count_calls(&format!("cp -a {}/. /srv/data/", source.path().display())), 1);
    assert_eq!(h.host.count_calls("rsync -a"), 0);
}

#[tokio::test]
async fn test_sync_rejects_relative_destination() {
    let h = Harness::new(FakeHost::provisioned());
    let source = tempfile::tempdir().unwrap();

    assert!(!h.lifecycle.sync_files(source.path(), "work", &h.cancel).await);
    assert_eq!(h.host.count_calls("rsync"), 0);
}
