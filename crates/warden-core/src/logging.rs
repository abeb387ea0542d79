use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static LOGGING_INIT: Once = Once::new();

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Plain,
            verbose: false,
        }
    }
}

/// Build the filter from `WARDEN_LOG`, then `RUST_LOG`, then the verbosity
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { Level::DEBUG } else { Level::WARN };
    std::env::var("WARDEN_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::default().add_directive(default_level.into()))
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(config: &LoggingConfig) {
    LOGGING_INIT.call_once(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter(config.verbose))
            .with_writer(std::io::stderr)
            .with_target(false);

        let result = match config.format {
            LogFormat::Json => builder
                .json()
                .with_current_span(false)
                .with_span_events(FmtSpan::NONE)
                .try_init(),
            LogFormat::Plain if config.verbose => builder
                .with_ansi(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::ACTIVE)
                .try_init(),
            LogFormat::Plain => builder
                .with_ansi(false)
                .with_span_events(FmtSpan::NONE)
                .try_init(),
        };

        // Another subscriber already installed, e.g. by a test harness.
        let _ = result;
    });
}
