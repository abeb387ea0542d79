//! Core types for the warden environment manager.
//!
//! This crate holds the data model shared by the lifecycle engine and the
//! command-line interface: status and health records, the service catalogue,
//! configuration, command execution and parsing of host/guest tool output.

pub mod audit;
pub mod config;
pub mod envfile;
pub mod error;
pub mod exec;
pub mod health;
pub mod logging;
pub mod network;
pub mod parse;
pub mod service;
pub mod shell;
pub mod status;

pub use audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, JsonlAuditSink, MemoryAuditSink, NoopAuditSink};
pub use config::{
    DistributionConfig, PathsConfig, ProxySettings, ResourceConfig, TimeoutConfig, WardenConfig,
};
pub use envfile::EnvFile;
pub use error::{WardenError, WardenResult};
pub use exec::{argv, CommandExecutor, CommandResult, ProcessExecutor};
pub use health::{AggregateHealthResult, HealthReportBuilder, ServiceHealthCheck};
pub use logging::{LogFormat, LoggingConfig};
pub use network::NetworkInfo;
pub use service::{HealthProbe, PortMapping, RestartPolicy, ServiceDefinition};
pub use status::{DistributionRecord, DistributionState, EnvironmentStatus, Readiness};
