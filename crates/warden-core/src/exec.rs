//! External command execution.
//!
//! Every interaction with the host subsystem, the guest and the container
//! runtime goes through [`CommandExecutor`]. Arguments are always passed as
//! an argument vector; nothing here interprets a shell string.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{WardenError, WardenResult};

/// Maximum captured bytes per stream
const MAX_OUTPUT_SIZE: usize = 4 * 1024 * 1024;

/// Outcome of one external command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time: Duration,
}

impl CommandResult {
    /// Success is the exit code alone, never the content of stdout
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stderr when present, otherwise stdout, trimmed
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs an external program and captures its output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `program` with `args`, killing it if `timeout` elapses or `cancel`
    /// fires. Exactly one child process per call, no retries.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult>;
}

/// [`CommandExecutor`] backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

/// Create a command that won't open a console window on Windows
fn silent_command(program: &str) -> Command {
    #[cfg(target_os = "windows")]
    {
        // CREATE_NO_WINDOW
        let mut cmd = Command::new(program);
        cmd.creation_flags(0x0800_0000);
        cmd
    }

    #[cfg(not(target_os = "windows"))]
    {
        Command::new(program)
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        debug!(program, ?args, ?timeout, "Running command");
        let started = Instant::now();

        let mut cmd = silent_command(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                WardenError::not_found(format!("program `{}` not found: {}", program, e))
            }
            std::io::ErrorKind::PermissionDenied => {
                WardenError::permission_denied(format!("cannot execute `{}`: {}", program, e))
            }
            _ => WardenError::command(program, e.to_string()),
        })?;

        // Dropping the output future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = tokio::time::sleep(timeout) => {
                warn!(program, ?timeout, "Command timed out, killed");
                return Err(WardenError::timeout(
                    format!("{} {}", program, args.join(" ")),
                    timeout,
                ));
            }
            _ = cancel.cancelled() => {
                warn!(program, "Command cancelled, killed");
                return Err(WardenError::cancelled(format!("{} {}", program, args.join(" "))));
            }
        };

        let result = CommandResult {
            // Terminated by signal has no code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: decode_output(truncate(&output.stdout)),
            stderr: decode_output(truncate(&output.stderr)),
            execution_time: started.elapsed(),
        };

        debug!(
            program,
            exit_code = result.exit_code,
            elapsed_ms = result.execution_time.as_millis() as u64,
            "Command finished"
        );
        Ok(result)
    }
}

fn truncate(bytes: &[u8]) -> &[u8] {
    if bytes.len() > MAX_OUTPUT_SIZE {
        warn!("Output truncated to {} bytes", MAX_OUTPUT_SIZE);
        &bytes[..MAX_OUTPUT_SIZE]
    } else {
        bytes
    }
}

/// Decode process output. `wsl.exe` writes UTF-16LE for most of its own
/// commands, so a BOM or a high proportion of NUL bytes selects UTF-16.
pub fn decode_output(bytes: &[u8]) -> String {
    let looks_utf16 = bytes.starts_with(&[0xFF, 0xFE])
        || (bytes.len() >= 4 && {
            let zeros = bytes.iter().skip(1).step_by(2).filter(|b| **b == 0).count();
            zeros * 2 >= bytes.len() / 2
        });

    if looks_utf16 {
        let body = bytes.strip_prefix(&[0xFF, 0xFE]).unwrap_or(bytes);
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Convenience for building argument vectors from string literals
pub fn argv<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
