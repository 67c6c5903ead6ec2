use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Started,
    Success,
    Failed,
    PartialSuccess,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub action: String,
    pub status: AuditStatus,
    pub details: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(user_id: &str, action: &str, status: AuditStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            status,
            details: Map::new(),
            error: None,
        }
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Write-only destination for audit events. Implementations must not fail the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
}

/// Emits each event as a JSON line on the `audit` tracing target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => info!(target: "audit", "{line}"),
            Err(err) => warn!(?err, action = %event.action, "failed to serialize audit event"),
        }
    }
}

/// Appends events to a JSON-lines file, one object per line.
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create audit log directory {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open audit log at {}", path.display()))?;

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event).context("failed to serialize audit event")?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open audit log at {}", self.path.display()))?;
        file.write_all(&line).await.context("failed to write audit event")?;
        file.flush().await.context("failed to flush audit log")?;
        Ok(())
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn emit(&self, event: AuditEvent) {
        if let Err(err) = self.append(&event).await {
            warn!(
                error = %format!("{err:#}"),
                action = %event.action,
                path = %self.path.display(),
                "audit event dropped"
            );
        }
    }
}
