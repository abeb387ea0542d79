//! Command-line interface for the warden environment manager.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use warden_core::config::WardenConfig;
use warden_core::logging::{self, LogFormat, LoggingConfig};
use warden_lifecycle::EnvironmentLifecycle;

mod commands;
mod output;
mod progress;

pub use output::*;

/// CLI arguments parser
#[derive(Parser)]
#[command(name = "warden", author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show subsystem and distribution status
    Status,

    /// Run a full health check
    Health,

    /// Provision the distribution and start every service
    Up,

    /// Show guest and host addresses and service endpoints
    Network,

    /// Manage the containerized services
    Services {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Copy a host directory into the guest
    Sync {
        /// Host directory
        source: PathBuf,
        /// Absolute guest directory
        destination: String,
    },

    /// Configure proxies for the guest and its container runtime
    Proxy {
        #[arg(long)]
        http: Option<String>,
        #[arg(long)]
        https: Option<String>,
        #[arg(long)]
        socks: Option<String>,
        #[arg(long)]
        no_proxy: Option<String>,
        /// Install a local anonymizing SOCKS proxy in the guest
        #[arg(long)]
        anonymize: bool,
        /// Remove all managed proxy settings
        #[arg(long, conflicts_with_all = ["http", "https", "socks", "no_proxy", "anonymize"])]
        clear: bool,
    },

    /// Set guest memory and processor limits
    Resources {
        /// Memory in GB
        #[arg(long)]
        memory: Option<u32>,
        /// Processor count
        #[arg(long)]
        cpus: Option<u32>,
    },

    /// Install the host subsystem
    Install,

    /// Export the distribution to a tar archive
    Export {
        /// Destination archive
        dest: PathBuf,
    },

    /// Write the administrator remediation bundle
    Remediate,
}

#[derive(Subcommand)]
pub enum ServiceAction {
    /// List container states
    Ps,
    /// Start a service
    Start { name: String },
    /// Stop a service
    Stop { name: String },
    /// Restart a service
    Restart { name: String },
}

/// Run the CLI application
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LoggingConfig {
        format: if cli.log_json { LogFormat::Json } else { LogFormat::Plain },
        verbose: cli.verbose,
    });

    let config = WardenConfig::load(cli.config.as_deref())?;
    let lifecycle = EnvironmentLifecycle::new(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    let json = cli.json;
    match cli.command {
        Commands::Status => commands::execute_status(&lifecycle, json, &cancel).await,
        Commands::Health => commands::execute_health(&lifecycle, json, &cancel).await,
        Commands::Up => commands::execute_up(&lifecycle, json, &cancel).await,
        Commands::Network => commands::execute_network(&lifecycle, json, &cancel).await,
        Commands::Services { action } => commands::execute_services(&lifecycle, action, json, &cancel).await,
        Commands::Sync { source, destination } => {
            commands::execute_sync(&lifecycle, &source, &destination, &cancel).await
        }
        Commands::Proxy {
            http,
            https,
            socks,
            no_proxy,
            anonymize,
            clear,
        } => {
            let settings = if clear {
                warden_core::config::ProxySettings::default()
            } else {
                warden_core::config::ProxySettings {
                    http,
                    https,
                    socks,
                    no_proxy,
                    install_anonymizer: anonymize,
                }
            };
            commands::execute_proxy(&lifecycle, &settings, &cancel).await
        }
        Commands::Resources { memory, cpus } => commands::execute_resources(&lifecycle, memory, cpus).await,
        Commands::Install => commands::execute_install(&lifecycle, json, &cancel).await,
        Commands::Export { dest } => commands::execute_export(&lifecycle, &dest, &cancel).await,
        Commands::Remediate => commands::execute_remediate(&lifecycle, json).await,
    }
}
