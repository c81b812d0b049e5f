//! In-memory job store

use crate::adapters::database::traits::{InsertOutcome, JobStore, QueueStats};
use crate::core::encryption::EncryptedPayload;
use crate::domain::ids::MessageId;
use crate::domain::job::{DeadLetterEntry, Job, JobOutput, JobStatus, JobVersion};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<MessageId, Job>,
    sources: HashMap<MessageId, EncryptedPayload>,
    outputs: HashMap<MessageId, JobOutput>,
    next_sequence: u64,
}

impl Inner {
    fn is_at(&self, message_id: &MessageId, expected: JobVersion) -> bool {
        self.jobs
            .get(message_id)
            .is_some_and(|job| job.version() == expected)
    }
}

/// Job store held in process memory
///
/// All mutations take the write lock, which makes `compare_and_set`,
/// `lease_next` and the version-checked payload writes atomic with respect
/// to each other.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_if_absent(&self, mut job: Job) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.jobs.get(&job.message_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        inner.next_sequence += 1;
        job.sequence = inner.next_sequence;
        inner.jobs.insert(job.message_id.clone(), job.clone());
        Ok(InsertOutcome::Inserted(job))
    }

    async fn get(&self, message_id: &MessageId) -> Result<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(message_id).cloned())
    }

    async fn compare_and_set(&self, expected: JobVersion, next: &Job) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.jobs.get_mut(&next.message_id) {
            Some(current) if current.version() == expected => {
                *current = next.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn lease_next(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let mut inner = self.inner.write().await;
        let Some(job) = inner
            .jobs
            .values_mut()
            .filter(|j| j.is_leasable(now))
            .min_by_key(|j| (Reverse(j.priority), j.sequence))
        else {
            return Ok(None);
        };
        job.mark_active(lease_until);
        Ok(Some(job.clone()))
    }

    async fn expired_leases(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut expired: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| j.lease_expired(now))
            .cloned()
            .collect();
        expired.sort_by_key(|j| j.lease_expires_at);
        expired.truncate(limit);
        Ok(expired)
    }

    async fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let inner = self.inner.read().await;
        let mut stats = QueueStats::default();
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Waiting if job.is_delayed(now) => stats.delayed += 1,
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.failed += 1,
            }
        }
        Ok(stats)
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let inner = self.inner.read().await;
        let mut dead: Vec<&Job> = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Dead)
            .collect();
        dead.sort_by_key(|j| Reverse((j.processed_at, j.sequence)));
        Ok(dead
            .into_iter()
            .take(limit)
            .map(DeadLetterEntry::from_job)
            .collect())
    }

    async fn save_source(
        &self,
        expected: JobVersion,
        message_id: &MessageId,
        payload: &EncryptedPayload,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.is_at(message_id, expected) {
            return Ok(false);
        }
        inner.sources.insert(message_id.clone(), payload.clone());
        Ok(true)
    }

    async fn load_source(&self, message_id: &MessageId) -> Result<Option<EncryptedPayload>> {
        Ok(self.inner.read().await.sources.get(message_id).cloned())
    }

    async fn complete_with_output(
        &self,
        expected: JobVersion,
        completed: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.is_at(&completed.message_id, expected) {
            return Ok(false);
        }
        inner
            .jobs
            .insert(completed.message_id.clone(), completed.clone());
        inner
            .outputs
            .insert(completed.message_id.clone(), output.clone());
        Ok(true)
    }

    async fn load_output(&self, message_id: &MessageId) -> Result<Option<JobOutput>> {
        Ok(self.inner.read().await.outputs.get(message_id).cloned())
    }
}
