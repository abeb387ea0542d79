//! Thin wrapper over the host subsystem CLI.
//!
//! Every call into the host tool or into a guest goes through [`WslHost`],
//! which fixes program names, the guest invocation syntax and the default
//! timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::{CommandExecutor, CommandResult};
use warden_core::shell;

pub const WSL_EXE: &str = "wsl.exe";
pub const DISM_EXE: &str = "dism.exe";
pub const IPCONFIG_EXE: &str = "ipconfig.exe";

/// User that first-boot configuration and runtime management run as
pub const ROOT_USER: &str = "root";

/// Handle for issuing commands to the host tool and into guests
#[derive(Clone)]
pub struct WslHost {
    executor: Arc<dyn CommandExecutor>,
    command_timeout: Duration,
}

impl WslHost {
    pub fn new(executor: Arc<dyn CommandExecutor>, command_timeout: Duration) -> Self {
        Self {
            executor,
            command_timeout,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Run an arbitrary host program with the default timeout
    pub async fn host_tool(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        self.executor
            .run(program, args, self.command_timeout, cancel)
            .await
    }

    /// Run the host subsystem CLI
    pub async fn wsl(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        self.executor.run(WSL_EXE, args, timeout, cancel).await
    }

    /// Run the host subsystem CLI and fail on a non-zero exit
    pub async fn wsl_ok(
        &self,
        args: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        let result = self.wsl(args, timeout, cancel).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(WardenError::command(
                format!("{} {}", WSL_EXE, args.join(" ")),
                result.error_text(),
            ))
        }
    }

    /// Run `argv` inside `distribution`. The vector reaches the guest as
    /// separate arguments after `--`.
    pub async fn guest(
        &self,
        distribution: &str,
        user: Option<&str>,
        argv: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        self.wsl(&guest_args(distribution, user, argv), timeout, cancel)
            .await
    }

    /// Run `argv` inside `distribution` and fail on a non-zero exit
    pub async fn guest_ok(
        &self,
        distribution: &str,
        user: Option<&str>,
        argv: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        let result = self.guest(distribution, user, argv, timeout, cancel).await?;
        if result.success() {
            Ok(result)
        } else {
            let program = argv.first().map(String::as_str).unwrap_or("guest command");
            warn!(distribution, program, exit_code = result.exit_code, "Guest command failed");
            Err(WardenError::command(program, result.error_text()))
        }
    }

    /// Run a script inside the guest with `sh -c`. Callers quote every
    /// spliced value with [`shell::quote`].
    pub async fn script(
        &self,
        distribution: &str,
        user: Option<&str>,
        script: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        self.guest_ok(distribution, user, &argv, timeout, cancel).await
    }

    /// Write `content` to `path` inside the guest as root
    pub async fn write_guest_file(
        &self,
        distribution: &str,
        path: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<()> {
        let argv = shell::write_file_argv(path, content);
        self.guest_ok(distribution, Some(ROOT_USER), &argv, self.command_timeout, cancel)
            .await?;
        Ok(())
    }

    /// Whether `path` exists inside the guest
    pub async fn guest_file_exists(
        &self,
        distribution: &str,
        path: &str,
        cancel: &CancellationToken,
    ) -> WardenResult<bool> {
        let argv = vec!["test".to_string(), "-f".to_string(), path.to_string()];
        let result = self
            .guest(distribution, Some(ROOT_USER), &argv, self.command_timeout, cancel)
            .await?;
        Ok(result.success())
    }
}

/// `-d <distribution> [-u <user>] -- argv...`
pub fn guest_args(distribution: &str, user: Option<&str>, argv: &[String]) -> Vec<String> {
    let mut args = vec!["-d".to_string(), distribution.to_string()];
    if let Some(user) = user {
        args.push("-u".to_string());
        args.push(user.to_string());
    }
    args.push("--".to_string());
    args.extend(argv.iter().cloned());
    args
}
