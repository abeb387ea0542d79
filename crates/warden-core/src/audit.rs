//! Audit trail of state-changing lifecycle operations.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::WardenResult;

/// Kind of state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    InstallSubsystem,
    Download,
    Import,
    Configure,
    SetVersion,
    Export,
    Unregister,
    Terminate,
    Shutdown,
    StartService,
    StopService,
    RestartService,
    Repair,
    ConfigureProxy,
    ConfigureResources,
    SyncFiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Succeeded,
    Failed,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// Distribution or service the action applied to
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, target: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            target: target.into(),
            outcome,
            details: None,
        }
    }

    /// Build from an operation result
    pub fn from_result<T, E: std::fmt::Display>(
        action: AuditAction,
        target: impl Into<String>,
        result: &Result<T, E>,
    ) -> Self {
        match result {
            Ok(_) => Self::new(action, target, AuditOutcome::Succeeded),
            Err(e) => Self::new(action, target, AuditOutcome::Failed).with_details(e.to_string()),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Receives audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> WardenResult<()>;
}

/// Discards every event
#[derive(Debug, Clone, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuditEvent) -> WardenResult<()> {
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> WardenResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Appends events as JSON lines
pub struct JsonlAuditSink {
    log_path: PathBuf,
    /// Serializes appends from concurrent operations
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new<P: Into<PathBuf>>(log_path: P) -> Self {
        Self {
            log_path: log_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Read back every parseable record; a missing log is empty
    pub async fn read_all(&self) -> WardenResult<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(&self.log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl AuditSink for JsonlAuditSink {
    async fn record(&self, event: AuditEvent) -> WardenResult<()> {
        let line = serde_json::to_string(&event)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?
            .write_all(format!("{}\n", line).as_bytes())
            .await?;
        Ok(())
    }
}
