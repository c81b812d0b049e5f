//! Job broker: submission, leasing and the retry state machine
//!
//! ```text
//! waiting -> active -> completed
//!              |
//!              +-> waiting (delayed) -> active -> ... -> dead
//! ```
//!
//! Every transition is a compare-and-set on `(status, attempts)`. A caller
//! holding a stale copy of the job loses the race and gets
//! [`FailOutcome::Stale`] (or `false`) instead of overwriting newer state.
//! All methods take `now` explicitly so tests control the clock.

use crate::adapters::database::{InsertOutcome, JobStore, StatsStore};
use crate::config::schema::QueueConfig;
use crate::core::queue::retry::{instant_after, RetryPolicy};
use crate::core::services::PipelineServices;
use crate::domain::alert::Alert;
use crate::domain::job::{ExternalStatus, Job, JobOutput, JobStatus, SubmitReceipt, SubmitRequest};
use crate::domain::Result;
use crate::sinks::{AlertSink, AuditEvent, AuditEventKind, AuditSink};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Expired leases handled per reaper sweep
const REAP_BATCH: usize = 100;

/// What a failure report did to the job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Rescheduled; the job becomes visible again at `visible_at`
    Retried {
        attempts: u32,
        visible_at: DateTime<Utc>,
    },
    /// Attempt budget exhausted
    DeadLettered { attempts: u32 },
    /// The job moved on since the caller leased it; nothing was written
    Stale,
}

/// Owns every job state transition
#[derive(Clone)]
pub struct Broker {
    jobs: Arc<dyn JobStore + Send + Sync>,
    stats: Arc<dyn StatsStore + Send + Sync>,
    alerts: Arc<dyn AlertSink + Send + Sync>,
    audit: Arc<dyn AuditSink + Send + Sync>,
    policy: RetryPolicy,
    lease_duration: Duration,
}

impl Broker {
    pub fn new(services: &PipelineServices, config: &QueueConfig) -> Self {
        Self {
            jobs: services.jobs.clone(),
            stats: services.stats.clone(),
            alerts: services.alerts.clone(),
            audit: services.audit.clone(),
            policy: RetryPolicy::from_config(config),
            lease_duration: Duration::from_secs(config.lease_duration_secs),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Accept a submission
    ///
    /// Idempotent on `messageId`: resubmitting a known ID leaves the stored
    /// job untouched and reports its current status.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the submission is malformed, or a store
    /// error if the job cannot be persisted.
    pub async fn submit(&self, request: SubmitRequest, now: DateTime<Utc>) -> Result<SubmitReceipt> {
        let job = Job::from_submission(request, self.policy.max_attempts, now)?;

        match self.jobs.insert_if_absent(job).await? {
            InsertOutcome::Inserted(job) => {
                tracing::info!(
                    message_id = %job.message_id,
                    client_id = %job.client_id,
                    mapping_id = %job.mapping_id,
                    priority = job.priority,
                    "Job queued"
                );
                if let Err(e) = self.stats.record_received(&job.client_id, now.date_naive()).await {
                    tracing::warn!(message_id = %job.message_id, error = %e, "Failed to record received stats");
                }
                self.audit(AuditEvent::for_job(AuditEventKind::Submitted, &job, now))
                    .await;

                Ok(SubmitReceipt {
                    message_id: job.message_id,
                    status: ExternalStatus::Queued,
                    created: true,
                })
            }
            InsertOutcome::Existing(job) => {
                let status = self.external_status(&job).await?;
                tracing::debug!(
                    message_id = %job.message_id,
                    status = ?status,
                    "Duplicate submission ignored"
                );
                Ok(SubmitReceipt {
                    message_id: job.message_id,
                    status,
                    created: false,
                })
            }
        }
    }

    /// Lease the next visible job, if any
    pub async fn lease(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let lease_until = instant_after(now, self.lease_duration);
        let leased = self.jobs.lease_next(now, lease_until).await?;

        if let Some(job) = &leased {
            crate::log_job_transition!(job.message_id, job.status.as_str(), job.attempts);
            self.audit(AuditEvent::for_job(AuditEventKind::Leased, job, now))
                .await;
        }
        Ok(leased)
    }

    /// Extend the lease on `job`
    ///
    /// Returns the renewed job, or `None` if the lease was lost.
    pub async fn renew_lease(&self, job: &Job, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut renewed = job.clone();
        renewed.lease_expires_at = Some(instant_after(now, self.lease_duration));

        if self.jobs.compare_and_set(job.version(), &renewed).await? {
            tracing::trace!(message_id = %job.message_id, "Lease renewed");
            Ok(Some(renewed))
        } else {
            tracing::warn!(message_id = %job.message_id, "Lease lost before renewal");
            Ok(None)
        }
    }

    /// Mark a leased job completed and store its output
    ///
    /// Both writes happen together or not at all. Returns `false` if the
    /// lease was lost in the meantime.
    pub async fn complete(&self, job: &Job, output: &JobOutput, now: DateTime<Utc>) -> Result<bool> {
        let mut completed = job.clone();
        completed.mark_completed(now);

        if !self
            .jobs
            .complete_with_output(job.version(), &completed, output)
            .await?
        {
            tracing::warn!(message_id = %job.message_id, "Completion discarded: lease lost");
            return Ok(false);
        }

        tracing::info!(message_id = %job.message_id, attempts = job.attempts + 1, "Job completed");
        self.audit(AuditEvent::for_job(AuditEventKind::Completed, &completed, now))
            .await;
        Ok(true)
    }

    /// Report a failed run of a leased job
    ///
    /// Consumes one attempt. The job is rescheduled with backoff while budget
    /// remains and dead-lettered otherwise; only the caller that wins the
    /// dead-letter transition raises the alert.
    pub async fn fail(&self, job: &Job, reason: &str, now: DateTime<Utc>) -> Result<FailOutcome> {
        self.fail_with(job, reason, now, AuditEventKind::Retried).await
    }

    /// Return expired leases to the queue as failures
    ///
    /// Returns the number of jobs this sweep moved.
    pub async fn reap_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.jobs.expired_leases(now, REAP_BATCH).await?;
        let mut reaped = 0;

        for job in expired {
            tracing::warn!(
                message_id = %job.message_id,
                lease_expires_at = ?job.lease_expires_at,
                "Lease expired without a report"
            );
            let outcome = self
                .fail_with(&job, "lease expired", now, AuditEventKind::LeaseExpired)
                .await?;
            if outcome != FailOutcome::Stale {
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn fail_with(
        &self,
        job: &Job,
        reason: &str,
        now: DateTime<Utc>,
        retry_event: AuditEventKind,
    ) -> Result<FailOutcome> {
        let expected = job.version();
        let mut next = job.clone();

        if job.is_last_attempt() {
            next.mark_dead(reason, now);
            if !self.jobs.compare_and_set(expected, &next).await? {
                return Ok(FailOutcome::Stale);
            }

            tracing::error!(
                message_id = %next.message_id,
                client_id = %next.client_id,
                attempts = next.attempts,
                reason = %reason,
                "Job dead-lettered"
            );
            self.on_dead_letter(&next, reason, now).await;
            return Ok(FailOutcome::DeadLettered {
                attempts: next.attempts,
            });
        }

        let delay = self.policy.delay_after(job.attempts + 1);
        let visible_at = instant_after(now, delay);
        next.mark_retry(reason, visible_at);
        if !self.jobs.compare_and_set(expected, &next).await? {
            return Ok(FailOutcome::Stale);
        }

        crate::log_retry_attempt!(
            next.message_id,
            next.attempts,
            next.max_attempts,
            delay.as_millis() as u64,
            reason
        );
        self.audit(AuditEvent::for_job(retry_event, &next, now).with_detail(reason))
            .await;

        Ok(FailOutcome::Retried {
            attempts: next.attempts,
            visible_at,
        })
    }

    async fn on_dead_letter(&self, job: &Job, reason: &str, now: DateTime<Utc>) {
        let alert = Alert::dead_letter(
            job.client_id.clone(),
            job.message_id.clone(),
            reason,
            job.attempts,
        );
        if let Err(e) = self.alerts.emit(&alert).await {
            tracing::warn!(message_id = %job.message_id, error = %e, "Failed to emit dead-letter alert");
        }
        if let Err(e) = self.stats.record_dead(&job.client_id, now.date_naive()).await {
            tracing::warn!(message_id = %job.message_id, error = %e, "Failed to record dead-letter stats");
        }
        self.audit(
            AuditEvent::for_job(AuditEventKind::DeadLettered, job, now).with_detail(reason),
        )
        .await;
    }

    async fn audit(&self, event: AuditEvent) {
        if let Err(e) = self.audit.record(&event).await {
            tracing::warn!(message_id = %event.message_id, error = %e, "Failed to write audit event");
        }
    }

    async fn external_status(&self, job: &Job) -> Result<ExternalStatus> {
        let output = match job.status {
            JobStatus::Completed => self.jobs.load_output(&job.message_id).await?,
            _ => None,
        };
        Ok(ExternalStatus::derive(job.status, output.as_ref()))
    }
}
