//! Environment status snapshot and distribution records.
//!
//! Everything here is re-derived from the host on every query. Nothing in
//! this module is cached or mutated in place.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder used when a version string could not be parsed
pub const UNKNOWN_VERSION: &str = "unknown";

/// Lifecycle state of a distribution as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionState {
    Unknown,
    Running,
    Stopped,
    Installing,
    Error,
}

impl DistributionState {
    /// Map the STATE column of the host listing onto a state
    pub fn from_listing(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "stopped" => Self::Stopped,
            "installing" | "converting" | "uninstalling" => Self::Installing,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for DistributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Installing => write!(f, "Installing"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One installed distribution. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Distribution name, unique per host
    pub name: String,
    /// Reported state
    pub state: DistributionState,
    /// Subsystem version column ("1" or "2")
    pub version: String,
    /// Guest address, when it has been resolved
    pub ip_address: Option<String>,
    /// Whether the host marks it as default
    pub is_default: bool,
    /// Install location on the host, when known
    pub install_path: Option<String>,
}

impl DistributionRecord {
    pub fn is_running(&self) -> bool {
        self.state == DistributionState::Running
    }
}

/// Snapshot of the host virtualization environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentStatus {
    /// Subsystem answered its version query
    pub installed: bool,
    /// Subsystem package version, or `unknown`
    pub subsystem_version: String,
    /// Kernel version, or `unknown`
    pub kernel_version: String,
    /// Effective subsystem version matches the configured target
    pub is_target_version: bool,
    /// Host feature name to confirmed-enabled flag
    pub required_host_features_enabled: BTreeMap<String, bool>,
    /// Installed distributions in listing order
    pub distributions: Vec<DistributionRecord>,
    /// The configured distribution is installed
    pub has_required_distribution: bool,
    /// Conjunction of the readiness factors
    pub ready: bool,
    /// Highest-priority explanation of the current state
    pub message: String,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl EnvironmentStatus {
    /// Status for a host where the subsystem did not answer at all
    pub fn not_installed(message: impl Into<String>) -> Self {
        Self {
            installed: false,
            subsystem_version: UNKNOWN_VERSION.to_string(),
            kernel_version: UNKNOWN_VERSION.to_string(),
            is_target_version: false,
            required_host_features_enabled: BTreeMap::new(),
            distributions: Vec::new(),
            has_required_distribution: false,
            ready: false,
            message: message.into(),
            captured_at: Utc::now(),
        }
    }

    /// Look up a distribution by name
    pub fn distribution(&self, name: &str) -> Option<&DistributionRecord> {
        self.distributions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    pub fn any_running(&self) -> bool {
        self.distributions.iter().any(DistributionRecord::is_running)
    }
}

/// Readiness factors, folded into `ready` and `message`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub installed: bool,
    pub target_version: bool,
    pub has_distribution: bool,
    pub any_running: bool,
}

impl Readiness {
    pub fn ready(&self) -> bool {
        self.installed && self.target_version && self.has_distribution && self.any_running
    }

    /// Message for the most fundamental missing factor
    pub fn message(&self, distribution: &str, target_version: u8) -> String {
        if !self.installed {
            "WSL is not installed or not responding".to_string()
        } else if !self.target_version {
            format!("WSL {} is required but not active", target_version)
        } else if !self.has_distribution {
            format!("Distribution '{}' is not installed", distribution)
        } else if !self.any_running {
            "No distribution is running".to_string()
        } else {
            "Ready".to_string()
        }
    }
}
