use std::process::ExitCode;

use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    match warden_cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "Command failed");
            eprintln!("{}", warden_cli::format_error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}
