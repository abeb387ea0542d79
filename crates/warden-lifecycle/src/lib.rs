//! Lifecycle engine for warden-managed WSL environments.
//!
//! Components, leaf first: [`host::WslHost`] issues commands,
//! [`status::StatusProber`] and [`network::NetworkResolver`] read state,
//! [`provision::DistributionProvisioner`] and
//! [`orchestrator::ServiceOrchestrator`] change it, [`health::HealthMonitor`]
//! folds everything into one verdict and [`facade::EnvironmentLifecycle`]
//! is the entry point for callers.

pub mod checks;
pub mod download;
pub mod facade;
pub mod health;
pub mod host;
pub mod network;
pub mod orchestrator;
pub mod probe;
pub mod provision;
pub mod proxy;
pub mod remediation;
pub mod resources;
pub mod runtime;
pub mod status;
pub mod sync;

pub use checks::ServiceChecker;
pub use download::{HttpImageDownloader, ImageDownloader};
pub use facade::{EnvironmentLifecycle, InstallOutcome, LifecycleBuilder, ReadyOutcome, ReadyReport};
pub use health::HealthMonitor;
pub use host::WslHost;
pub use network::NetworkResolver;
pub use orchestrator::{ServiceOrchestrator, StartOutcome, StartReport};
pub use probe::{ConnectivityProbe, HttpProbe, ReqwestHttpProbe, TcpConnectivityProbe};
pub use provision::DistributionProvisioner;
pub use remediation::RemediationBundle;
pub use runtime::ContainerRuntime;
pub use status::StatusProber;
pub use sync::SyncMethod;
