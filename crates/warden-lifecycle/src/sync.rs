//! One-way file sync from the host into the guest.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::argv;
use warden_core::shell::host_to_guest_path;

use crate::host::WslHost;

/// How the copy was carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
    /// Incremental delta copy
    Rsync,
    /// Plain recursive copy
    Copy,
}

/// Copy the contents of host directory `source` into guest directory
/// `destination`, as `user` when given
pub async fn sync_files(
    host: &WslHost,
    distribution: &str,
    user: Option<&str>,
    source: &Path,
    destination: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> WardenResult<SyncMethod> {
    if !destination.starts_with('/') {
        return Err(WardenError::validation(format!(
            "guest destination must be absolute: {}",
            destination
        )));
    }
    let guest_source = host_to_guest_path(source)?;
    let src = format!("{}/", guest_source.trim_end_matches('/'));
    let dst = format!("{}/", destination.trim_end_matches('/'));

    let has_rsync = host
        .guest(distribution, user, &argv(["rsync", "--version"]), host.command_timeout(), cancel)
        .await
        .map(|r| r.success())
        .unwrap_or(false);

    let method = if has_rsync {
        debug!(distribution, src = %src, dst = %dst, "Syncing with rsync");
        host.guest_ok(distribution, user, &argv(["rsync", "-a", src.as_str(), dst.as_str()]), timeout, cancel)
            .await?;
        SyncMethod::Rsync
    } else {
        debug!(distribution, src = %src, dst = %dst, "rsync unavailable, copying");
        host.guest_ok(distribution, user, &argv(["mkdir", "-p", dst.as_str()]), host.command_timeout(), cancel)
            .await?;
        let contents = format!("{}.", src);
        host.guest_ok(distribution, user, &argv(["cp", "-a", contents.as_str(), dst.as_str()]), timeout, cancel)
            .await?;
        SyncMethod::Copy
    };

    info!(distribution, source = %source.display(), destination, method = ?method, "Files synced");
    Ok(method)
}
