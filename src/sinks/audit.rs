//! Audit trail of job lifecycle transitions
//!
//! Entries carry a SHA-256 digest of the source payload so a record can be
//! matched to a submission without the trail ever holding patient data.

use crate::config::schema::AuditConfig;
use crate::domain::ids::{ClientId, MessageId};
use crate::domain::job::Job;
use crate::domain::{MedbridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Lifecycle transition being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Submitted,
    Leased,
    Completed,
    Retried,
    DeadLettered,
    LeaseExpired,
}

/// One line of the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEventKind,
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub attempts: u32,
    /// SHA-256 of the source payload (never the plaintext)
    pub source_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEvent {
    /// Build an event describing `job` as it is after the transition
    pub fn for_job(event: AuditEventKind, job: &Job, now: DateTime<Utc>) -> Self {
        Self {
            timestamp: now,
            event,
            message_id: job.message_id.clone(),
            client_id: job.client_id.clone(),
            attempts: job.attempts,
            source_digest: source_digest(&job.source_data),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Hex SHA-256 of the canonical JSON encoding of a source payload
pub fn source_digest(source: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    // Map keys serialize in sorted order, so equal payloads hash equally
    hasher.update(Value::Object(source.clone()).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<()>;
}

/// Discards every event (audit disabled)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: &AuditEvent) -> Result<()> {
        Ok(())
    }
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

/// Appends events as JSON lines to a file
pub struct FileAuditSink {
    path: PathBuf,
    // Serializes appends so concurrent workers never interleave lines
    write_lock: Mutex<()>,
}

impl FileAuditSink {
    /// Create a file sink, creating the parent directory if needed
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MedbridgeError::Audit(format!(
                    "Failed to create audit log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)
            .map_err(|e| MedbridgeError::Audit(format!("Failed to serialize audit entry: {e}")))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                MedbridgeError::Audit(format!(
                    "Failed to open audit log {}: {e}",
                    self.path.display()
                ))
            })?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MedbridgeError::Audit(format!("Failed to write audit entry: {e}")))?;
        file.flush()
            .await
            .map_err(|e| MedbridgeError::Audit(format!("Failed to flush audit log: {e}")))?;
        Ok(())
    }
}

/// Build the sink selected by `[audit]`
pub fn create_audit_sink(config: &AuditConfig) -> Result<Arc<dyn AuditSink + Send + Sync>> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink) as Arc<dyn AuditSink + Send + Sync>);
    }
    tracing::info!(path = %config.path, "Audit trail enabled");
    let sink = FileAuditSink::new(&config.path)?;
    Ok(Arc::new(sink) as Arc<dyn AuditSink + Send + Sync>)
}
