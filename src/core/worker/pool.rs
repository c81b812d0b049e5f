//! Worker pool
//!
//! `concurrency` workers each lease one job at a time and run it through a
//! [`JobRunner`]. A separate reaper task returns expired leases to the
//! queue. On shutdown workers stop leasing, finish the job in hand, and are
//! aborted if they overrun the grace period.

use super::pipeline::{JobRunner, RunOutcome};
use crate::config::schema::QueueConfig;
use crate::core::queue::{Broker, FailOutcome};
use crate::core::services::PipelineServices;
use crate::domain::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Counts of run outcomes since the pool started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSummary {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub lease_lost: u64,
}

impl PoolSummary {
    pub fn total(&self) -> u64 {
        self.completed + self.retried + self.dead_lettered + self.lease_lost
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    lease_lost: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &RunOutcome) {
        let counter = match outcome {
            RunOutcome::Completed(_) => &self.completed,
            RunOutcome::Failed {
                outcome: FailOutcome::Retried { .. },
                ..
            } => &self.retried,
            RunOutcome::Failed {
                outcome: FailOutcome::DeadLettered { .. },
                ..
            } => &self.dead_lettered,
            RunOutcome::Failed {
                outcome: FailOutcome::Stale,
                ..
            }
            | RunOutcome::LeaseLost => &self.lease_lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PoolSummary {
        PoolSummary {
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            lease_lost: self.lease_lost.load(Ordering::Relaxed),
        }
    }
}

/// Pool of queue workers plus the lease reaper
pub struct WorkerPool {
    runner: JobRunner,
    concurrency: usize,
    poll_interval: Duration,
    reaper_interval: Duration,
    shutdown_timeout: Duration,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(services: PipelineServices, config: &QueueConfig) -> Self {
        let broker = Broker::new(&services, config);
        let runner = JobRunner::new(
            services,
            broker,
            Duration::from_secs(config.job_timeout_secs),
        );
        Self {
            runner,
            concurrency: config.concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            reaper_interval: Duration::from_secs(config.reaper_interval_secs.max(1)),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn broker(&self) -> &Broker {
        self.runner.broker()
    }

    pub fn services(&self) -> &PipelineServices {
        self.runner.services()
    }

    pub fn summary(&self) -> PoolSummary {
        self.counters.snapshot()
    }

    /// Run until `shutdown` flips to `true`
    ///
    /// Returns the outcome counts of every run the pool finished.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<PoolSummary> {
        tracing::info!(
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting worker pool"
        );

        let mut tasks = JoinSet::new();
        for worker_id in 0..self.concurrency {
            tasks.spawn(worker_loop(
                worker_id,
                self.runner.clone(),
                self.poll_interval,
                shutdown.clone(),
                self.counters.clone(),
            ));
        }
        tasks.spawn(reaper_loop(
            self.runner.broker().clone(),
            self.reaper_interval,
            shutdown.clone(),
        ));

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        tracing::info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "Shutdown requested, waiting for in-flight jobs"
        );

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Worker task panicked");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Shutdown grace period elapsed, aborting workers; their leases will expire"
            );
            tasks.abort_all();
        }

        let summary = self.summary();
        tracing::info!(
            completed = summary.completed,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            "Worker pool stopped"
        );
        Ok(summary)
    }

    /// Process jobs on the current task until none is visible
    ///
    /// Jobs held back by a retry delay are left in place. Used by one-shot
    /// commands and tests.
    pub async fn drain(&self) -> Result<PoolSummary> {
        while let Some(job) = self.runner.broker().lease(Utc::now()).await? {
            let outcome = self.runner.run(job).await?;
            self.counters.record(&outcome);
        }
        Ok(self.summary())
    }
}

async fn worker_loop(
    worker_id: usize,
    runner: JobRunner,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<Counters>,
) {
    tracing::debug!(worker_id, "Worker started");

    while !*shutdown.borrow() {
        match runner.broker().lease(Utc::now()).await {
            Ok(Some(job)) => {
                let message_id = job.message_id.clone();
                tracing::debug!(worker_id, message_id = %message_id, attempts = job.attempts, "Leased job");
                match runner.run(job).await {
                    Ok(outcome) => counters.record(&outcome),
                    Err(e) => {
                        tracing::error!(worker_id, message_id = %message_id, error = %e, "Failed to report job outcome");
                    }
                }
            }
            Ok(None) => {
                if idle(poll_interval, &mut shutdown).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "Lease attempt failed");
                if idle(poll_interval, &mut shutdown).await {
                    break;
                }
            }
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

async fn reaper_loop(broker: Broker, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match broker.reap_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "Returned expired leases to the queue"),
                    Err(e) => tracing::warn!(error = %e, "Lease reaper sweep failed"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Sleep for `period` or until shutdown; `true` means stop
async fn idle(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{seed_mappings, Stores};
    use crate::config::schema::MappingsConfig;
    use crate::config::secret_string;
    use crate::core::encryption::ConfigKeyProvider;
    use crate::core::mapping::presets;
    use crate::domain::job::SubmitRequest;
    use crate::domain::JobStatus;
    use serde_json::json;

    async fn pool(config: &QueueConfig) -> WorkerPool {
        let mut keys = ConfigKeyProvider::default();
        keys.insert(
            "clinic-a",
            secret_string("0123456789abcdef0123456789abcdef".to_string()),
        );
        let stores = Stores::in_memory();
        seed_mappings(stores.mappings.as_ref(), &MappingsConfig::default())
            .await
            .unwrap();
        WorkerPool::new(PipelineServices::new(stores, Arc::new(keys)), config)
    }

    fn request(message_id: &str) -> SubmitRequest {
        serde_json::from_value(json!({
            "messageId": message_id,
            "clientId": "clinic-a",
            "mappingId": presets::BODY_TEMPERATURE,
            "sourceData": {"patientId": "p-1", "temperature": 36.9},
            "encryptionKeyRef": "clinic-a"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_pool_processes_queue_until_shutdown() {
        let config = QueueConfig {
            concurrency: 3,
            poll_interval_ms: 10,
            ..QueueConfig::default()
        };
        let pool = pool(&config).await;
        for i in 0..10 {
            pool.broker()
                .submit(request(&format!("msg-{i}")), Utc::now())
                .await
                .unwrap();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = Arc::new(pool);
        let handle = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run(shutdown_rx).await }
        });

        for _ in 0..200 {
            if pool.summary().completed == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.completed, 10);
        assert_eq!(summary.total(), 10);
    }

    #[tokio::test]
    async fn test_pool_stops_when_sender_dropped() {
        let config = QueueConfig {
            poll_interval_ms: 10,
            ..QueueConfig::default()
        };
        let pool = pool(&config).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        let summary = tokio::time::timeout(Duration::from_secs(5), pool.run(shutdown_rx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary, PoolSummary::default());
    }

    #[tokio::test]
    async fn test_drain_processes_visible_jobs() {
        let pool = pool(&QueueConfig::default()).await;
        pool.broker().submit(request("msg-a"), Utc::now()).await.unwrap();
        pool.broker().submit(request("msg-b"), Utc::now()).await.unwrap();

        let summary = pool.drain().await.unwrap();
        assert_eq!(summary.completed, 2);

        assert!(pool.broker().lease(Utc::now()).await.unwrap().is_none());
        let jobs = &pool.services().jobs;
        for id in ["msg-a", "msg-b"] {
            let job = jobs.get(&id.parse().unwrap()).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
        }
    }
}
