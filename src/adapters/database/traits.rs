//! Store abstraction traits
//!
//! The job store is the single source of truth for job state. Every
//! lifecycle transition goes through [`JobStore::compare_and_set`] (or the
//! equivalent atomic [`JobStore::lease_next`] and
//! [`JobStore::complete_with_output`]), keyed by message ID and conditioned
//! on the `(status, attempts)` pair the caller last observed.

use crate::core::encryption::EncryptedPayload;
use crate::core::mapping::MappingConfig;
use crate::domain::ids::{ClientId, MappingId, MessageId};
use crate::domain::job::{DeadLetterEntry, Job, JobOutput, JobVersion};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of an idempotent insert
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The job was new and has been stored (with its sequence assigned)
    Inserted(Job),
    /// A job with the same message ID already existed; it is returned unchanged
    Existing(Job),
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub active: u64,
    /// Waiting and visible now
    pub waiting: u64,
    pub completed: u64,
    /// Dead-lettered jobs
    pub failed: u64,
    /// Waiting but held back by a retry delay
    pub delayed: u64,
}

/// Per-client, per-day processing counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub client_id: ClientId,
    pub date: NaiveDate,
    pub received: u64,
    pub processed: u64,
    pub failed: u64,
    pub average_latency_ms: f64,
}

impl DailyStats {
    pub fn empty(client_id: ClientId, date: NaiveDate) -> Self {
        Self {
            client_id,
            date,
            received: 0,
            processed: 0,
            failed: 0,
            average_latency_ms: 0.0,
        }
    }

    /// Fold one processed run into the counters
    pub fn record_processed(&mut self, is_valid: bool, latency_ms: u64) {
        self.processed += 1;
        if !is_valid {
            self.failed += 1;
        }
        self.average_latency_ms +=
            (latency_ms as f64 - self.average_latency_ms) / self.processed as f64;
    }
}

/// Durable job state
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Check the store is reachable
    async fn test_connection(&self) -> Result<()>;

    /// Store `job` unless its message ID is already known
    async fn insert_if_absent(&self, job: Job) -> Result<InsertOutcome>;

    async fn get(&self, message_id: &MessageId) -> Result<Option<Job>>;

    /// Replace the stored job with `next` if its current version equals `expected`
    ///
    /// Returns `false` when another writer got there first.
    async fn compare_and_set(&self, expected: JobVersion, next: &Job) -> Result<bool>;

    /// Atomically lease the next visible waiting job
    ///
    /// Higher priority first, then submission order. The returned job is
    /// already active with `lease_expires_at = lease_until`.
    async fn lease_next(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Job>>;

    /// Active jobs whose lease expired at or before `now`
    async fn expired_leases(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>>;

    async fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats>;

    /// Dead-lettered jobs, most recent first
    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>>;

    /// Store the encrypted source while the job is still at `expected`
    ///
    /// Returns `false`, writing nothing, once the job has moved on.
    async fn save_source(
        &self,
        expected: JobVersion,
        message_id: &MessageId,
        payload: &EncryptedPayload,
    ) -> Result<bool>;

    async fn load_source(&self, message_id: &MessageId) -> Result<Option<EncryptedPayload>>;

    /// Complete the job and store its output in one step
    ///
    /// Same contract as [`JobStore::compare_and_set`]: when the job is no
    /// longer at `expected` neither the job nor the output is written.
    async fn complete_with_output(
        &self,
        expected: JobVersion,
        completed: &Job,
        output: &JobOutput,
    ) -> Result<bool>;

    async fn load_output(&self, message_id: &MessageId) -> Result<Option<JobOutput>>;
}

/// Mapping configuration lookup
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<MappingConfig>>;

    /// Insert or replace a mapping
    async fn put(&self, config: MappingConfig) -> Result<()>;

    async fn list(&self) -> Result<Vec<MappingId>>;
}

/// Per-client daily counters
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn record_received(&self, client_id: &ClientId, date: NaiveDate) -> Result<()>;

    /// Record a completed pipeline run
    async fn record_processed(
        &self,
        client_id: &ClientId,
        date: NaiveDate,
        is_valid: bool,
        latency_ms: u64,
    ) -> Result<()>;

    /// Record a dead-lettered job
    async fn record_dead(&self, client_id: &ClientId, date: NaiveDate) -> Result<()>;

    async fn daily(&self, client_id: &ClientId, date: NaiveDate) -> Result<Option<DailyStats>>;
}
