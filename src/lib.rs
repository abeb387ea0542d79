//! Warden WSL environment manager.
//!
//! Provisions a WSL distribution, runs a catalogue of containerized
//! services inside it and reports on the health of the whole stack.

pub use warden_core as core;
pub use warden_lifecycle as lifecycle;

pub use warden_core::{WardenConfig, WardenError, WardenResult};
pub use warden_lifecycle::{EnvironmentLifecycle, ReadyOutcome};

/// Initialize logging for the entire system
pub fn init() {
    warden_core::logging::init(&warden_core::logging::LoggingConfig::default());
}

/// Version of the Warden system
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
