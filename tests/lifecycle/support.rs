//! Scripted stand-ins for the host tool, the guest, the container runtime
//! and the network probes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use warden_core::config::{TimeoutConfig, WardenConfig};
use warden_core::error::{WardenError, WardenResult};
use warden_core::exec::{CommandExecutor, CommandResult};
use warden_core::service::{HealthProbe, PortMapping, RestartPolicy, ServiceDefinition};
use warden_core::MemoryAuditSink;
use warden_lifecycle::provision::CONFIGURED_SENTINEL;
use warden_lifecycle::{ConnectivityProbe, EnvironmentLifecycle, HttpProbe, ImageDownloader};

pub const DISTRO: &str = "warden";
pub const GUEST_IP: &str = "172.28.1.5";
pub const IMAGE_URL: &str = "https://images.example.test/warden-rootfs.tar.gz";
pub const MIN_IMAGE_BYTES: u64 = 1024;
pub const IMAGE_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct Distro {
    pub name: String,
    pub state: String,
    pub version: u8,
}

#[derive(Debug, Default)]
pub struct HostState {
    /// `wsl.exe` present at all
    pub installed: bool,
    /// `wsl --install` refuses without elevation
    pub install_needs_elevation: bool,
    /// `wsl --version` hangs past its timeout
    pub version_times_out: bool,
    /// `wsl --import` hangs past its timeout
    pub import_times_out: bool,
    pub distros: Vec<Distro>,
    pub configured: bool,
    pub runtime_installed: bool,
    pub daemon_running: bool,
    /// Starting the runtime daemon fails
    pub daemon_start_fails: bool,
    /// Launching this container takes the daemon down with it
    pub daemon_crashes_on: Option<String>,
    pub rsync_available: bool,
    pub networks: BTreeSet<String>,
    /// Container name to `docker ps` status text
    pub containers: BTreeMap<String, String>,
    /// Containers whose `docker run` fails
    pub failing_launches: BTreeSet<String>,
    /// Containers with a declared runtime health state
    pub container_health: BTreeMap<String, String>,
    pub calls: Vec<String>,
}

/// In-memory host that answers every command the lifecycle issues
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    /// Subsystem installed, nothing else present
    pub fn empty() -> Self {
        let host = Self::default();
        host.with(|s| {
            s.installed = true;
            s.rsync_available = true;
        });
        host
    }

    /// Distribution imported, configured and running with the runtime up
    pub fn provisioned() -> Self {
        let host = Self::empty();
        host.with(|s| {
            s.distros.push(Distro {
                name: DISTRO.to_string(),
                state: "Running".to_string(),
                version: 2,
            });
            s.configured = true;
            s.runtime_installed = true;
            s.daemon_running = true;
        });
        host
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut HostState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }

    pub fn set_distro_state(&self, state: &str) {
        self.with(|s| {
            for d in s.distros.iter_mut() {
                d.state = state.to_string();
            }
        });
    }

    pub fn set_container_status(&self, name: &str, status: &str) {
        self.with(|s| {
            s.containers.insert(name.to_string(), status.to_string());
        });
    }

    fn wsl(&self, args: &[String]) -> WardenResult<CommandResult> {
        let mut s = self.state.lock().unwrap();
        let a: Vec<&str> = args.iter().map(String::as_str).collect();

        if !s.installed {
            if a.first() == Some(&"--install") {
                if s.install_needs_elevation {
                    return Ok(fail(1, "The requested operation requires elevation."));
                }
                s.installed = true;
                return Ok(ok(""));
            }
            return Err(WardenError::not_found("program `wsl.exe` not found"));
        }

        match a.as_slice() {
            ["--version"] => {
                if s.version_times_out {
                    return Err(WardenError::timeout("wsl.exe --version", Duration::from_secs(5)));
                }
                Ok(ok("WSL version: 2.0.14.0\nKernel version: 5.15.133.1-1\nWSLg version: 1.0.59\n"))
            }
            ["--status"] => Ok(ok("Default Distribution: warden\nDefault Version: 2\n")),
            ["--list", "--verbose"] => {
                if s.distros.is_empty() {
                    return Ok(CommandResult {
                        exit_code: -1,
                        stdout: "Windows Subsystem for Linux has no installed distributions.\n".to_string(),
                        stderr: String::new(),
                        execution_time: Duration::ZERO,
                    });
                }
                let mut out = String::from("  NAME      STATE           VERSION\n");
                for (i, d) in s.distros.iter().enumerate() {
                    let marker = if i == 0 { '*' } else { ' ' };
                    out.push_str(&format!("{} {}    {}    {}\n", marker, d.name, d.state, d.version));
                }
                Ok(ok(&out))
            }
            ["--install", "--no-distribution"] => Ok(ok("")),
            ["--set-default-version", _] => Ok(ok("")),
            ["--import", name, _dir, image, "--version", version] => {
                if s.import_times_out {
                    return Err(WardenError::timeout("wsl.exe --import", Duration::from_secs(300)));
                }
                if !Path::new(image).exists() {
                    return Ok(fail(1, "The system cannot find the file specified."));
                }
                s.distros.push(Distro {
                    name: name.to_string(),
                    state: "Stopped".to_string(),
                    version: version.parse().unwrap_or(2),
                });
                Ok(ok("Import in progress, this may take a few minutes.\n"))
            }
            ["--set-version", name, version] => {
                let version = version.parse().unwrap_or(2);
                for d in s.distros.iter_mut().filter(|d| d.name == *name) {
                    d.version = version;
                }
                Ok(ok("Conversion complete.\n"))
            }
            ["--terminate", name] => {
                for d in s.distros.iter_mut().filter(|d| d.name == *name) {
                    d.state = "Stopped".to_string();
                }
                Ok(ok(""))
            }
            ["--shutdown"] => {
                for d in s.distros.iter_mut() {
                    d.state = "Stopped".to_string();
                }
                Ok(ok(""))
            }
            ["--export", _, dest] => {
                std::fs::write(dest, b"exported").map_err(WardenError::from)?;
                Ok(ok(""))
            }
            ["--unregister", name] => {
                s.distros.retain(|d| d.name != *name);
                Ok(ok(""))
            }
            ["-d", name, rest @ ..] => {
                let Some(d) = s.distros.iter_mut().find(|d| d.name == *name) else {
                    return Ok(fail(1, "There is no distribution with the supplied name."));
                };
                d.state = "Running".to_string();

                let argv = match rest {
                    ["-u", _user, "--", argv @ ..] => argv,
                    ["--", argv @ ..] => argv,
                    _ => return Ok(fail(1, "bad guest invocation")),
                };
                Ok(guest(&mut s, argv))
            }
            _ => Ok(fail(1, "unsupported wsl.exe invocation")),
        }
    }
}

fn guest(s: &mut HostState, argv: &[&str]) -> CommandResult {
    match argv {
        ["true"] => ok(""),
        ["test", "-f", path] => {
            if *path == CONFIGURED_SENTINEL && s.configured {
                ok("")
            } else {
                fail(1, "")
            }
        }
        ["sh", "-c", script, ..] => {
            if script.contains(CONFIGURED_SENTINEL) {
                s.configured = true;
            }
            if script.contains("docker.io") {
                s.runtime_installed = true;
            }
            if script.contains("start docker") {
                if s.daemon_start_fails {
                    return fail(1, "Job for docker.service failed because the control process exited with error code.");
                }
                s.daemon_running = s.runtime_installed;
            }
            ok("")
        }
        ["ip", "-4", "-o", "addr", "show", "dev", "eth0"] => ok(&format!(
            "2: eth0    inet {}/20 brd 172.28.15.255 scope global eth0\\       valid_lft forever preferred_lft forever\n",
            GUEST_IP
        )),
        ["hostname", "-I"] => ok(&format!("{} \n", GUEST_IP)),
        ["ip", "route", "show", "default"] => ok("default via 172.28.0.1 dev eth0 proto kernel\n"),
        ["rsync", "--version"] => {
            if s.rsync_available {
                ok("rsync  version 3.2.7  protocol version 31\n")
            } else {
                fail(127, "sh: 1: rsync: not found")
            }
        }
        ["rsync", ..] | ["mkdir", ..] | ["cp", ..] => ok(""),
        ["docker", rest @ ..] => docker(s, rest),
        _ => fail(127, "command not found"),
    }
}

fn docker(s: &mut HostState, args: &[&str]) -> CommandResult {
    if !s.runtime_installed {
        return fail(127, "sh: 1: docker: not found");
    }
    if args == ["--version"] {
        return ok("Docker version 24.0.7, build 24.0.7-0ubuntu2\n");
    }
    if !s.daemon_running {
        return fail(1, "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?");
    }

    match args {
        ["info", ..] => ok("24.0.7\n"),
        ["network", "ls", ..] => {
            let names: Vec<&str> = ["bridge", "host", "none"]
                .into_iter()
                .chain(s.networks.iter().map(String::as_str))
                .collect();
            ok(&format!("{}\n", names.join("\n")))
        }
        ["network", "create", name] => {
            s.networks.insert(name.to_string());
            ok("0f3c9a\n")
        }
        ["rm", "-f", name] => match s.containers.remove(*name) {
            Some(_) => ok(&format!("{}\n", name)),
            None => fail(1, &format!("Error: No such container: {}", name)),
        },
        ["run", rest @ ..] => {
            let Some(name) = rest.iter().position(|a| *a == "--name").and_then(|i| rest.get(i + 1)) else {
                return fail(125, "missing --name");
            };
            if s.failing_launches.contains(*name) {
                return fail(125, "Unable to find image locally\npull access denied, repository does not exist");
            }
            if let Some(network) = rest.iter().position(|a| *a == "--network").and_then(|i| rest.get(i + 1)) {
                if !["bridge", "host", "none"].contains(network) && !s.networks.contains(*network) {
                    return fail(125, &format!("docker: Error response from daemon: network {} not found.", network));
                }
            }
            s.containers.insert(name.to_string(), "Up 1 second".to_string());
            if s.daemon_crashes_on.as_deref() == Some(*name) {
                s.daemon_running = false;
            }
            ok("4b1e2d7c\n")
        }
        ["stop", name] => match s.containers.get_mut(*name) {
            Some(status) => {
                *status = "Exited (0) 1 second ago".to_string();
                ok(&format!("{}\n", name))
            }
            None => no_such(name),
        },
        ["start", name] => match s.containers.get_mut(*name) {
            Some(status) => {
                *status = "Up 1 second".to_string();
                ok(&format!("{}\n", name))
            }
            None => no_such(name),
        },
        ["ps", "-a", ..] => {
            let out: String = s
                .containers
                .iter()
                .map(|(name, status)| format!("{}\t{}\n", name, status))
                .collect();
            ok(&out)
        }
        ["inspect", "--format", _, name] => {
            if !s.containers.contains_key(*name) {
                return no_such(name);
            }
            ok(&format!("{}\n", s.container_health.get(*name).cloned().unwrap_or_default()))
        }
        ["stats", ..] => {
            let out: String = s
                .containers
                .iter()
                .filter(|(_, status)| status.starts_with("Up"))
                .map(|(name, _)| format!("{}\t100MiB / 2GiB\n", name))
                .collect();
            ok(&out)
        }
        _ => fail(1, "unsupported docker invocation"),
    }
}

fn no_such(name: &str) -> CommandResult {
    fail(1, &format!("Error response from daemon: No such container: {}", name))
}

fn ok(stdout: &str) -> CommandResult {
    CommandResult {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
        execution_time: Duration::from_millis(1),
    }
}

fn fail(exit_code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
        execution_time: Duration::from_millis(1),
    }
}

#[async_trait]
impl CommandExecutor for FakeHost {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> WardenResult<CommandResult> {
        if cancel.is_cancelled() {
            return Err(WardenError::cancelled(program));
        }
        self.with(|s| s.calls.push(format!("{} {}", program, args.join(" "))));

        match program {
            "wsl.exe" => self.wsl(args),
            "dism.exe" => Ok(ok("Feature Name : VirtualMachinePlatform\nState : Enabled\n")),
            "ipconfig.exe" => Ok(ok(
                "Windows IP Configuration\n\nEthernet adapter vEthernet (WSL):\n\n   Connection-specific DNS Suffix  . :\n   IPv4 Address. . . . . . . . . . . : 172.28.0.1\n   Subnet Mask . . . . . . . . . . . : 255.255.240.0\n",
            )),
            other => Err(WardenError::not_found(format!("program `{}` not found", other))),
        }
    }
}

/// Writes a plausible image and counts how often it was asked to
#[derive(Default)]
pub struct CountingDownloader {
    pub downloads: AtomicUsize,
}

impl CountingDownloader {
    pub fn count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageDownloader for CountingDownloader {
    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> WardenResult<u64> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, vec![0x1f; IMAGE_BYTES]).await?;
        Ok(IMAGE_BYTES as u64)
    }
}

/// HTTP probe answering a fixed status per URL fragment, 200 otherwise
#[derive(Default)]
pub struct FakeHttp {
    pub statuses: Mutex<BTreeMap<String, u16>>,
}

impl FakeHttp {
    pub fn respond(&self, fragment: &str, status: u16) {
        self.statuses.lock().unwrap().insert(fragment.to_string(), status);
    }
}

#[async_trait]
impl HttpProbe for FakeHttp {
    async fn get_status(&self, url: &str, _timeout: Duration) -> WardenResult<u16> {
        let statuses = self.statuses.lock().unwrap();
        Ok(statuses
            .iter()
            .find(|(fragment, _)| url.contains(fragment.as_str()))
            .map(|(_, status)| *status)
            .unwrap_or(200))
    }
}

/// TCP probe that always connects, or always refuses
pub struct FakeConnectivity {
    pub reachable: bool,
}

#[async_trait]
impl ConnectivityProbe for FakeConnectivity {
    async fn connect(&self, host: &str, port: u16, _timeout: Duration) -> WardenResult<Duration> {
        if self.reachable {
            Ok(Duration::from_millis(3))
        } else {
            Err(WardenError::network(format!("connection to {}:{} refused", host, port)))
        }
    }
}

pub fn catalogue() -> Vec<ServiceDefinition> {
    vec![
        ServiceDefinition {
            name: "vector-db".to_string(),
            image: "qdrant/qdrant:v1.9.2".to_string(),
            ports: vec![PortMapping::same(6333)],
            environment: BTreeMap::new(),
            volumes: BTreeMap::new(),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: None,
            cpu_limit: None,
            health_check_command: None,
            network_name: None,
            probe: HealthProbe::Http {
                path: "/healthz".to_string(),
                accept_unauthorized: false,
            },
            command: Vec::new(),
        },
        ServiceDefinition {
            name: "tool-server".to_string(),
            image: "ghcr.io/warden/tool-server:latest".to_string(),
            ports: vec![PortMapping {
                host_port: 18080,
                container_port: 8080,
            }],
            environment: BTreeMap::from([("LOG_LEVEL".to_string(), "info".to_string())]),
            volumes: BTreeMap::new(),
            restart_policy: RestartPolicy::UnlessStopped,
            memory_limit_bytes: None,
            cpu_limit: None,
            health_check_command: Some("curl -f http://localhost:8080/health".to_string()),
            network_name: None,
            probe: HealthProbe::Runtime,
            command: Vec::new(),
        },
    ]
}

pub fn test_config(root: &Path) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.distribution.name = DISTRO.to_string();
    config.distribution.image_url = IMAGE_URL.to_string();
    config.distribution.min_image_bytes = MIN_IMAGE_BYTES;
    config.paths.state_dir = root.join("state");
    config.paths.download_dir = root.join("downloads");
    config.paths.install_dir = root.join("distros");
    config.paths.wslconfig = root.join(".wslconfig");
    config.timeouts = TimeoutConfig::immediate();
    config.services = catalogue();
    config
}

/// A facade wired to fakes, plus handles to inspect them
pub struct Harness {
    pub host: FakeHost,
    pub downloader: Arc<CountingDownloader>,
    pub http: Arc<FakeHttp>,
    pub audit: MemoryAuditSink,
    pub lifecycle: EnvironmentLifecycle,
    pub cancel: CancellationToken,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(host: FakeHost) -> Self {
        Self::with_connectivity(host, true)
    }

    pub fn with_connectivity(host: FakeHost, reachable: bool) -> Self {
        Self::build(host, reachable, |_| {})
    }

    /// Harness whose configuration is adjusted before the facade is built
    pub fn with_config(host: FakeHost, adjust: impl FnOnce(&mut WardenConfig)) -> Self {
        Self::build(host, true, adjust)
    }

    fn build(host: FakeHost, reachable: bool, adjust: impl FnOnce(&mut WardenConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        adjust(&mut config);
        let downloader = Arc::new(CountingDownloader::default());
        let http = Arc::new(FakeHttp::default());
        let audit = MemoryAuditSink::new();

        let lifecycle = EnvironmentLifecycle::builder(config)
            .executor(Arc::new(host.clone()))
            .downloader(downloader.clone())
            .http_probe(http.clone())
            .connectivity_probe(Arc::new(FakeConnectivity { reachable }))
            .audit(Arc::new(audit.clone()))
            .build()
            .unwrap();

        Self {
            host,
            downloader,
            http,
            audit,
            lifecycle,
            cancel: CancellationToken::new(),
            dir,
        }
    }

    pub fn image_path(&self) -> PathBuf {
        self.dir.path().join("downloads").join("warden-rootfs.tar.gz")
    }
}
