use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{WardenError, WardenResult};
use crate::service::{default_services, ServiceDefinition};
use crate::shell::is_valid_user_name;

/// Host features the subsystem depends on
pub const DEFAULT_HOST_FEATURES: [&str; 2] = ["Microsoft-Windows-Subsystem-Linux", "VirtualMachinePlatform"];

/// Configuration for a warden-managed environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub distribution: DistributionConfig,
    pub paths: PathsConfig,
    pub timeouts: TimeoutConfig,
    pub resources: ResourceConfig,
    pub proxy: ProxySettings,
    /// Shared container network inside the guest
    pub network_name: String,
    /// Host features probed by the status check
    pub required_features: Vec<String>,
    /// Managed service catalogue
    pub services: Vec<ServiceDefinition>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            distribution: DistributionConfig::default(),
            paths: PathsConfig::default(),
            timeouts: TimeoutConfig::default(),
            resources: ResourceConfig::default(),
            proxy: ProxySettings::default(),
            network_name: "warden-net".to_string(),
            required_features: DEFAULT_HOST_FEATURES.iter().map(|f| f.to_string()).collect(),
            services: default_services(),
        }
    }
}

/// The managed distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Name registered with the host subsystem
    pub name: String,
    /// Root filesystem tarball
    pub image_url: String,
    /// Expected SHA-256 of the tarball, hex
    pub image_sha256: Option<String>,
    /// Artifacts at or below this size are treated as truncated
    pub min_image_bytes: u64,
    /// Non-root account created on first boot
    pub default_user: String,
    /// Required subsystem version
    pub target_version: u8,
    /// Extra packages installed on first boot
    pub packages: Vec<String>,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            name: "warden".to_string(),
            image_url: "https://cloud-images.ubuntu.com/wsl/jammy/current/ubuntu-jammy-wsl-amd64-wsl.rootfs.tar.gz".to_string(),
            image_sha256: None,
            min_image_bytes: 50 * 1024 * 1024,
            default_user: "analyst".to_string(),
            target_version: 2,
            packages: vec![
                "ca-certificates".to_string(),
                "curl".to_string(),
                "iproute2".to_string(),
                "rsync".to_string(),
                "sudo".to_string(),
            ],
        }
    }
}

/// Host-side locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Config cache, remediation bundle and audit log live here
    pub state_dir: PathBuf,
    /// Downloaded images
    pub download_dir: PathBuf,
    /// Virtual disk location for imported distributions
    pub install_dir: PathBuf,
    /// Host subsystem config file (`%USERPROFILE%\.wslconfig`)
    pub wslconfig: PathBuf,
    pub audit_log: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let state_dir = dirs::data_local_dir()
            .map(|d| d.join("warden"))
            .unwrap_or_else(|| PathBuf::from(".warden"));
        let wslconfig = dirs::home_dir()
            .map(|d| d.join(".wslconfig"))
            .unwrap_or_else(|| PathBuf::from(".wslconfig"));
        Self {
            download_dir: state_dir.join("downloads"),
            install_dir: state_dir.join("distributions"),
            audit_log: Some(state_dir.join("audit.jsonl")),
            state_dir,
            wslconfig,
        }
    }
}

/// Timeouts and fixed delays. Zero delays are allowed, zero timeouts are not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub command_secs: u64,
    pub install_secs: u64,
    pub download_secs: u64,
    pub probe_ms: u64,
    /// Wait between starting services and the first health pass
    pub settle_secs: u64,
    /// Wait between stop and start on restart
    pub restart_delay_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_secs: 30,
            install_secs: 300,
            download_secs: 1800,
            probe_ms: 2000,
            settle_secs: 10,
            restart_delay_secs: 2,
        }
    }
}

impl TimeoutConfig {
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    pub fn install(&self) -> Duration {
        Duration::from_secs(self.install_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// Near-zero timings for tests and simulations
    pub fn immediate() -> Self {
        Self {
            command_secs: 5,
            install_secs: 5,
            download_secs: 5,
            probe_ms: 200,
            settle_secs: 0,
            restart_delay_secs: 0,
        }
    }
}

/// Guest VM resource limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub memory_gb: Option<u32>,
    pub cpus: Option<u32>,
}

/// Proxy settings applied to the guest and its container runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub socks: Option<String>,
    pub no_proxy: Option<String>,
    /// Install a local anonymizing SOCKS proxy inside the guest
    pub install_anonymizer: bool,
}

impl ProxySettings {
    pub fn is_empty(&self) -> bool {
        self.http.is_none()
            && self.https.is_none()
            && self.socks.is_none()
            && self.no_proxy.is_none()
            && !self.install_anonymizer
    }
}

impl WardenConfig {
    /// Default location: `<config dir>/warden/warden.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("warden"))
            .unwrap_or_else(|| PathBuf::from(".warden"))
            .join("warden.toml")
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WardenError::config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Load `path` when given, else the default path when it exists, else
    /// defaults; environment overrides apply last
    pub fn load(path: Option<&Path>) -> WardenResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// `WARDEN_DISTRIBUTION` and `WARDEN_STATE_DIR`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("WARDEN_DISTRIBUTION") {
            if !name.trim().is_empty() {
                self.distribution.name = name.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var("WARDEN_STATE_DIR") {
            if !dir.trim().is_empty() {
                let dir = PathBuf::from(dir.trim());
                self.paths.download_dir = dir.join("downloads");
                self.paths.install_dir = dir.join("distributions");
                self.paths.audit_log = Some(dir.join("audit.jsonl"));
                self.paths.state_dir = dir;
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> WardenResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> WardenResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WardenError::config(format!("Failed to serialize config: {}", e)))
    }

    pub fn from_toml(content: &str) -> WardenResult<Self> {
        toml::from_str(content)
            .map_err(|e| WardenError::config(format!("Failed to parse config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> WardenResult<()> {
        if self.distribution.name.trim().is_empty() {
            return Err(WardenError::config("distribution name must not be empty"));
        }
        if self.distribution.name.chars().any(char::is_whitespace) {
            return Err(WardenError::config("distribution name must not contain whitespace"));
        }
        if !is_valid_user_name(&self.distribution.default_user) {
            return Err(WardenError::config(format!(
                "invalid default user name: {}",
                self.distribution.default_user
            )));
        }
        if self.timeouts.command_secs == 0 || self.timeouts.install_secs == 0 || self.timeouts.probe_ms == 0 {
            return Err(WardenError::config("command, install and probe timeouts must be non-zero"));
        }
        if self.network_name.trim().is_empty() {
            return Err(WardenError::config("network name must not be empty"));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(WardenError::config(format!("duplicate service name: {}", service.name)));
            }
        }
        Ok(())
    }

    /// Look up a catalogue entry
    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }
}
