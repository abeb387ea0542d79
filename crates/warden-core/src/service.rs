use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Host to container port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
}

impl PortMapping {
    pub const fn same(port: u16) -> Self {
        Self {
            host_port: port,
            container_port: port,
        }
    }
}

/// Container restart policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure,
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::No => write!(f, "no"),
            Self::Always => write!(f, "always"),
            Self::UnlessStopped => write!(f, "unless-stopped"),
            Self::OnFailure => write!(f, "on-failure"),
        }
    }
}

/// How liveness of a service is established
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HealthProbe {
    /// HTTP GET against the service endpoint
    Http {
        path: String,
        /// Treat 401 as reachable (auth-protected liveness paths)
        #[serde(default)]
        accept_unauthorized: bool,
    },
    /// Ask the container runtime whether the container is marked healthy
    Runtime,
}

/// Static catalogue entry for one managed service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Container name, unique within the catalogue
    pub name: String,
    /// Image reference
    pub image: String,
    /// Port mappings, first entry is the primary endpoint
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Guest path to container path
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    pub memory_limit_bytes: Option<u64>,
    pub cpu_limit: Option<f32>,
    /// Container-level health command passed to the runtime
    pub health_check_command: Option<String>,
    /// Overrides the shared network
    pub network_name: Option<String>,
    /// Liveness probe used by the health monitor
    pub probe: HealthProbe,
    /// Extra arguments appended after the image
    #[serde(default)]
    pub command: Vec<String>,
}

impl ServiceDefinition {
    /// Port used for endpoint synthesis
    pub fn primary_port(&self) -> Option<u16> {
        self.ports.first().map(|p| p.container_port)
    }

    /// Network the container joins
    pub fn network<'a>(&'a self, default_network: &'a str) -> &'a str {
        self.network_name.as_deref().unwrap_or(default_network)
    }

    /// Argument vector for launching this service with the container runtime
    pub fn run_args(&self, default_network: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--network".to_string(),
            self.network(default_network).to_string(),
            "--restart".to_string(),
            self.restart_policy.to_string(),
        ];

        for port in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", port.host_port, port.container_port));
        }
        for (key, value) in &self.environment {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (host, container) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}", host, container));
        }
        if let Some(bytes) = self.memory_limit_bytes {
            args.push("--memory".to_string());
            args.push(bytes.to_string());
        }
        if let Some(cpus) = self.cpu_limit {
            args.push("--cpus".to_string());
            args.push(cpus.to_string());
        }
        if let Some(cmd) = &self.health_check_command {
            args.push("--health-cmd".to_string());
            args.push(cmd.clone());
            args.push("--health-interval".to_string());
            args.push("10s".to_string());
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

const GIB: u64 = 1024 * 1024 * 1024;

/// Default catalogue: vector DB, relational DB, object store, tool server
pub fn default_services() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition {
            name: "qdrant".to_string(),
            image: "qdrant/qdrant:v1.9.2".to_string(),
            ports: vec![PortMapping::same(6333), PortMapping::same(6334)],
            environment: BTreeMap::new(),
            volumes: BTreeMap::from([(
                "/var/lib/warden/qdrant".to_string(),
                "/qdrant/storage".to_string(),
            )]),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: Some(2 * GIB),
            cpu_limit: Some(2.0),
            health_check_command: None,
            network_name: None,
            probe: HealthProbe::Http {
                path: "/healthz".to_string(),
                accept_unauthorized: false,
            },
            command: Vec::new(),
        },
        ServiceDefinition {
            name: "postgres".to_string(),
            image: "postgres:16-alpine".to_string(),
            ports: vec![PortMapping::same(5432)],
            environment: BTreeMap::from([
                ("POSTGRES_DB".to_string(), "warden".to_string()),
                ("POSTGRES_USER".to_string(), "warden".to_string()),
                ("POSTGRES_PASSWORD".to_string(), "warden".to_string()),
            ]),
            volumes: BTreeMap::from([(
                "/var/lib/warden/postgres".to_string(),
                "/var/lib/postgresql/data".to_string(),
            )]),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: Some(GIB),
            cpu_limit: Some(1.0),
            health_check_command: Some("pg_isready -U warden".to_string()),
            network_name: None,
            probe: HealthProbe::Runtime,
            command: Vec::new(),
        },
        ServiceDefinition {
            name: "minio".to_string(),
            image: "minio/minio:latest".to_string(),
            ports: vec![PortMapping::same(9000), PortMapping::same(9001)],
            environment: BTreeMap::from([
                ("MINIO_ROOT_USER".to_string(), "warden".to_string()),
                ("MINIO_ROOT_PASSWORD".to_string(), "warden-secret".to_string()),
            ]),
            volumes: BTreeMap::from([(
                "/var/lib/warden/minio".to_string(),
                "/data".to_string(),
            )]),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: Some(GIB),
            cpu_limit: Some(1.0),
            health_check_command: None,
            network_name: None,
            probe: HealthProbe::Http {
                path: "/minio/health/live".to_string(),
                accept_unauthorized: false,
            },
            command: vec![
                "server".to_string(),
                "/data".to_string(),
                "--console-address".to_string(),
                ":9001".to_string(),
            ],
        },
        ServiceDefinition {
            name: "tool-server".to_string(),
            image: "ghcr.io/warden-rs/tool-server:latest".to_string(),
            ports: vec![PortMapping::same(8080)],
            environment: BTreeMap::new(),
            volumes: BTreeMap::from([(
                "/var/lib/warden/evidence".to_string(),
                "/evidence".to_string(),
            )]),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: Some(GIB),
            cpu_limit: Some(1.0),
            health_check_command: None,
            network_name: None,
            probe: HealthProbe::Http {
                path: "/health".to_string(),
                accept_unauthorized: true,
            },
            command: Vec::new(),
        },
    ]
}
