//! Parsers for the free-form text printed by the host subsystem, the guest
//! network tools and the container runtime.
//!
//! All parsers are tolerant: malformed input yields `None` or skips the row,
//! never an error. Switching any producer to a structured output mode only
//! touches this module.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::status::{DistributionRecord, DistributionState};

static WSL_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WSL[^:\n]*:\s*([0-9]+(?:\.[0-9]+)+)").unwrap());
static KERNEL_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Kernel[^:\n]*:\s*([0-9]+(?:\.[0-9]+)+[^\s]*)").unwrap());
static DEFAULT_VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Default Version\s*:\s*([0-9]+)").unwrap());
static FEATURE_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*State\s*:\s*(\w+)").unwrap());
static INET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\binet\s+([0-9]{1,3}(?:\.[0-9]{1,3}){3})/").unwrap());
static GATEWAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^default\s+via\s+([0-9]{1,3}(?:\.[0-9]{1,3}){3})").unwrap());
static ADAPTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\S.*adapter\s+(.+?):\s*$").unwrap());
static IPV4_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)IPv4 Address[ .]*:\s*([0-9]{1,3}(?:\.[0-9]{1,3}){3})").unwrap());
static SIZE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([kKMGT]?i?B)\s*$").unwrap());

/// Strip NULs, BOMs and other non-printable noise, keeping tabs and newlines
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| *c == '\n' || *c == '\t' || (!c.is_control() && *c != '\u{feff}'))
        .collect()
}

/// Subsystem package version from `wsl --version`
pub fn parse_subsystem_version(output: &str) -> Option<String> {
    let clean = sanitize(output);
    WSL_VERSION_RE
        .captures(&clean)
        .map(|c| c[1].to_string())
}

/// Kernel version from `wsl --version`
pub fn parse_kernel_version(output: &str) -> Option<String> {
    let clean = sanitize(output);
    KERNEL_VERSION_RE
        .captures(&clean)
        .map(|c| c[1].to_string())
}

/// Default subsystem version from `wsl --status`
pub fn parse_default_version(output: &str) -> Option<u8> {
    let clean = sanitize(output);
    DEFAULT_VERSION_RE
        .captures(&clean)
        .and_then(|c| c[1].parse().ok())
}

/// Major component of a dotted version
pub fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

/// Rows of `wsl --list --verbose`. The header is skipped, a leading `*`
/// marks the default distribution, and names may contain spaces.
pub fn parse_distribution_list(output: &str) -> Vec<DistributionRecord> {
    let clean = sanitize(output);
    let mut records = Vec::new();

    for line in clean.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (is_default, rest) = match trimmed.strip_prefix('*') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        let columns: Vec<&str> = rest.split_whitespace().collect();
        if columns.len() < 3 {
            continue;
        }
        if columns[0].eq_ignore_ascii_case("NAME") && columns[columns.len() - 1].eq_ignore_ascii_case("VERSION") {
            continue;
        }

        let version = columns[columns.len() - 1];
        if version.parse::<u8>().is_err() {
            continue;
        }
        let state = columns[columns.len() - 2];
        let name = columns[..columns.len() - 2].join(" ");

        records.push(DistributionRecord {
            name,
            state: DistributionState::from_listing(state),
            version: version.to_string(),
            ip_address: None,
            is_default,
            install_path: None,
        });
    }

    records
}

/// Feature state from `dism /get-featureinfo`: `Some(true)` when enabled
pub fn parse_feature_enabled(output: &str) -> Option<bool> {
    let clean = sanitize(output);
    FEATURE_STATE_RE
        .captures(&clean)
        .map(|c| c[1].eq_ignore_ascii_case("enabled"))
}

/// First IPv4 address from `ip -4 -o addr show`, falling back to the first
/// token of `hostname -I`
pub fn parse_guest_ip(output: &str) -> Option<String> {
    let clean = sanitize(output);
    if let Some(c) = INET_RE.captures(&clean) {
        return Some(c[1].to_string());
    }
    clean
        .split_whitespace()
        .next()
        .filter(|token| token.parse::<std::net::Ipv4Addr>().is_ok())
        .map(str::to_string)
}

/// Gateway from `ip route show default`
pub fn parse_default_gateway(output: &str) -> Option<String> {
    let clean = sanitize(output);
    GATEWAY_RE
        .captures(&clean)
        .map(|c| c[1].to_string())
}

/// Host adapter name and IPv4 from `ipconfig` for the first adapter whose
/// name contains `marker` (case-insensitive)
pub fn parse_host_adapter(output: &str, marker: &str) -> Option<(String, Option<String>)> {
    let clean = sanitize(output);
    let marker = marker.to_ascii_lowercase();
    let mut current: Option<String> = None;
    let mut found: Option<(String, Option<String>)> = None;

    for line in clean.lines() {
        if let Some(c) = ADAPTER_RE.captures(line.trim_end()) {
            if found.is_some() {
                break;
            }
            let name = c[1].trim().to_string();
            current = name.to_ascii_lowercase().contains(&marker).then_some(name);
            if let Some(name) = &current {
                found = Some((name.clone(), None));
            }
            continue;
        }
        if current.is_some() {
            if let Some(c) = IPV4_RE.captures(line) {
                if let Some((_, addr)) = found.as_mut() {
                    if addr.is_none() {
                        *addr = Some(c[1].to_string());
                    }
                }
            }
        }
    }

    found
}

/// Container state as reported by the runtime's status column
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ContainerState {
    Running,
    Exited,
    Restarting,
    Created,
    Other(String),
}

impl ContainerState {
    /// Map `docker ps` STATUS text ("Up 3 minutes (healthy)", "Exited (1) ...")
    pub fn from_status(status: &str) -> Self {
        let status = status.trim();
        let lower = status.to_ascii_lowercase();
        if lower.starts_with("up") {
            Self::Running
        } else if lower.starts_with("exited") {
            Self::Exited
        } else if lower.starts_with("restarting") {
            Self::Restarting
        } else if lower.starts_with("created") {
            Self::Created
        } else {
            Self::Other(status.to_string())
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// `docker ps -a --format '{{.Names}}\t{{.Status}}'`
pub fn parse_container_list(output: &str) -> BTreeMap<String, ContainerState> {
    sanitize(output)
        .lines()
        .filter_map(|line| {
            let (name, status) = line.split_once('\t')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), ContainerState::from_status(status)))
        })
        .collect()
}

/// `docker stats --no-stream --format '{{.Name}}\t{{.MemUsage}}'`, used part
/// of the memory column in bytes
pub fn parse_memory_stats(output: &str) -> BTreeMap<String, u64> {
    sanitize(output)
        .lines()
        .filter_map(|line| {
            let (name, usage) = line.split_once('\t')?;
            let used = usage.split('/').next()?;
            Some((name.trim().to_string(), parse_size(used)?))
        })
        .collect()
}

/// Sizes as printed by the container runtime ("512MiB", "1.5GB", "0B")
pub fn parse_size(text: &str) -> Option<u64> {
    let c = SIZE_RE.captures(text)?;
    let value: f64 = c[1].parse().ok()?;
    let multiplier: f64 = match &c[2] {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "TiB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "kB" | "KB" => 1e3,
        "MB" => 1e6,
        "GB" => 1e9,
        "TB" => 1e12,
        _ => return None,
    };
    Some((value * multiplier) as u64)
}

/// Hint derived from known import error substrings and HRESULTs
pub fn import_failure_hint(stderr: &str) -> Option<&'static str> {
    let lower = sanitize(stderr).to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["disk full", "not enough space", "no space", "0x80070070", "0x80070027"]) {
        Some("not enough free disk space on the install drive")
    } else if has(&["corrupt", "unexpected end", "0x8000000d", "invalid archive", "not a valid"]) {
        Some("the root filesystem archive looks corrupt; delete it so it is downloaded again")
    } else if has(&["access is denied", "permission", "0x80070005"]) {
        Some("permission denied; run from an account that may write the install directory")
    } else if has(&["not supported", "unsupported", "0x80370102", "virtual machine platform"]) {
        Some("virtualization is unsupported or disabled; enable the Virtual Machine Platform feature and BIOS virtualization")
    } else {
        None
    }
}
