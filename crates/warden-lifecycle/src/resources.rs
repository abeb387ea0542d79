//! Host-side `.wslconfig` editing and the local config cache.

use std::path::Path;

use tracing::info;

use warden_core::config::ResourceConfig;
use warden_core::envfile::{self, EnvFile};
use warden_core::error::{WardenError, WardenResult};

/// Section holding VM-wide settings
pub const WSL2_SECTION: &str = "wsl2";

/// Minimal INI document that keeps every line it does not touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WslConfigFile {
    lines: Vec<String>,
}

impl WslConfigFile {
    pub fn parse(contents: &str) -> Self {
        Self {
            lines: contents.lines().map(str::to_string).collect(),
        }
    }

    /// Load from disk; a missing file is empty
    pub async fn load(path: &Path) -> WardenResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> WardenResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, self.render()).await?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }

    /// Index range `[header, end)` of `section`, if present
    fn section_range(&self, section: &str) -> Option<(usize, usize)> {
        let start = self
            .lines
            .iter()
            .position(|line| section_name(line).is_some_and(|name| name.eq_ignore_ascii_case(section)))?;
        let end = self.lines[start + 1..]
            .iter()
            .position(|line| section_name(line).is_some())
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.lines.len());
        Some((start, end))
    }

    fn key_index(&self, section: &str, key: &str) -> Option<usize> {
        let (start, end) = self.section_range(section)?;
        (start + 1..end).find(|&i| entry_key(&self.lines[i]).is_some_and(|k| k.eq_ignore_ascii_case(key)))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<String> {
        let index = self.key_index(section, key)?;
        self.lines[index]
            .split_once('=')
            .map(|(_, value)| value.trim().to_string())
    }

    /// Set `key` in `section`, creating the section when needed
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let line = format!("{}={}", key, value);
        if let Some(index) = self.key_index(section, key) {
            self.lines[index] = line;
            return;
        }
        match self.section_range(section) {
            Some((start, end)) => {
                // Insert after the last non-blank line of the section.
                let mut at = end;
                while at > start + 1 && self.lines[at - 1].trim().is_empty() {
                    at -= 1;
                }
                self.lines.insert(at, line);
            }
            None => {
                if self.lines.last().is_some_and(|l| !l.trim().is_empty()) {
                    self.lines.push(String::new());
                }
                self.lines.push(format!("[{}]", section));
                self.lines.push(line);
            }
        }
    }

    pub fn remove(&mut self, section: &str, key: &str) {
        if let Some(index) = self.key_index(section, key) {
            self.lines.remove(index);
        }
    }
}

fn section_name(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn entry_key(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    trimmed.split_once('=').map(|(key, _)| key.trim())
}

/// Merge resource limits into `.wslconfig` and the config cache. `None`
/// leaves the existing value alone. Takes effect after the next shutdown.
pub async fn configure_resources(
    wslconfig: &Path,
    state_dir: &Path,
    resources: &ResourceConfig,
) -> WardenResult<()> {
    if resources.memory_gb == Some(0) || resources.cpus == Some(0) {
        return Err(WardenError::validation("memory and processor counts must be positive"));
    }

    let mut file = WslConfigFile::load(wslconfig).await?;
    let cache_path = envfile::cache_path(state_dir);
    let mut cache = EnvFile::load(&cache_path).await?;

    if let Some(memory) = resources.memory_gb {
        file.set(WSL2_SECTION, "memory", &format!("{}GB", memory));
        cache.set("WARDEN_MEMORY_GB", memory.to_string());
    }
    if let Some(cpus) = resources.cpus {
        file.set(WSL2_SECTION, "processors", &cpus.to_string());
        cache.set("WARDEN_CPUS", cpus.to_string());
    }

    file.save(wslconfig).await?;
    cache.save(&cache_path).await?;
    info!(memory_gb = ?resources.memory_gb, cpus = ?resources.cpus, "Resource limits written");
    Ok(())
}
