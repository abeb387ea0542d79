use std::io;
use std::time::Duration;
use thiserror::Error;

/// Custom result type for warden operations
pub type WardenResult<T> = Result<T, WardenError>;

/// Custom error type for warden operations
#[derive(Debug, Clone, Error)]
pub enum WardenError {
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timed out after {duration:?}: {operation}")]
    Timeout { operation: String, duration: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("{operation}: {} of the requested operations failed", .failures.len())]
    PartialFailure {
        operation: String,
        failures: Vec<(String, String)>,
    },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Import of {distribution} failed: {stderr}{}", .hint.as_ref().map(|h| format!(" (hint: {})", h)).unwrap_or_default())]
    ImportFailed {
        distribution: String,
        stderr: String,
        hint: Option<String>,
    },

    #[error("Configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("Command failed: {0} - {1}")]
    CommandFailed(String, String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Provisioning error: {0}")]
    Provision(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WardenError {
    /// Create a new unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        WardenError::Unavailable(msg.into())
    }

    /// Create a new permission error
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        WardenError::PermissionDenied(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration: Duration) -> Self {
        WardenError::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        WardenError::NotFound(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        WardenError::ValidationFailed(msg.into())
    }

    /// Create a new download error
    pub fn download<S: Into<String>>(msg: S) -> Self {
        WardenError::DownloadFailed(msg.into())
    }

    /// Create a new configuration-step error
    pub fn configuration_failed<S: Into<String>>(msg: S) -> Self {
        WardenError::ConfigurationFailed(msg.into())
    }

    /// Create a new command error
    pub fn command<P: Into<String>, S: Into<String>>(program: P, stderr: S) -> Self {
        WardenError::CommandFailed(program.into(), stderr.into())
    }

    /// Create a new cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        WardenError::Cancelled(msg.into())
    }

    /// Create a new provisioning error
    pub fn provision<S: Into<String>>(msg: S) -> Self {
        WardenError::Provision(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        WardenError::Config(msg.into())
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        WardenError::Parse(msg.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        WardenError::Network(msg.into())
    }

    /// Whether the error means the operation needs an elevated caller
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, WardenError::PermissionDenied(_))
    }

    /// Whether the error came from a missing executable
    pub fn is_not_found(&self) -> bool {
        matches!(self, WardenError::NotFound(_))
    }
}

impl From<io::Error> for WardenError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WardenError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for WardenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                operation: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "http request".to_string()),
                duration: Duration::ZERO,
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}
