//! Read-only status queries over the job store

use crate::adapters::database::{DailyStats, JobStore, QueueStats, StatsStore};
use crate::core::services::PipelineServices;
use crate::domain::ids::{ClientId, MessageId};
use crate::domain::job::{DeadLetterEntry, ExternalStatus};
use crate::domain::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Caller-facing view of one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub message_id: MessageId,
    pub status: ExternalStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    /// Combined mapping errors and finding messages of the completed run
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Status queries; never mutates job state
#[derive(Clone)]
pub struct StatusService {
    jobs: Arc<dyn JobStore + Send + Sync>,
    stats: Arc<dyn StatsStore + Send + Sync>,
}

impl StatusService {
    pub fn new(services: &PipelineServices) -> Self {
        Self {
            jobs: services.jobs.clone(),
            stats: services.stats.clone(),
        }
    }

    /// Current status of a message; `None` when the ID is unknown
    pub async fn get_status(&self, message_id: &MessageId) -> Result<Option<StatusView>> {
        let Some(job) = self.jobs.get(message_id).await? else {
            return Ok(None);
        };
        let output = self.jobs.load_output(message_id).await?;

        Ok(Some(StatusView {
            status: ExternalStatus::derive(job.status, output.as_ref()),
            errors: output.map(|o| o.errors).unwrap_or_default(),
            message_id: job.message_id,
            attempts: job.attempts,
            created_at: job.created_at,
            processed_at: job.processed_at,
            last_error: job.last_error,
        }))
    }

    pub async fn queue_stats(&self) -> Result<QueueStats> {
        self.jobs.queue_stats(Utc::now()).await
    }

    /// Most recent dead letters first
    pub async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        self.jobs.dead_letters(limit).await
    }

    /// Counters for one client and day, zeroed when nothing was recorded
    pub async fn daily_stats(&self, client_id: &ClientId, date: NaiveDate) -> Result<DailyStats> {
        Ok(self
            .stats
            .daily(client_id, date)
            .await?
            .unwrap_or_else(|| DailyStats::empty(client_id.clone(), date)))
    }
}
