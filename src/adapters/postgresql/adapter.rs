//! PostgreSQL adapter implementing the store traits
//!
//! Job transitions are single conditional `UPDATE` statements so the
//! compare-and-set holds across processes. Source and output writes carry
//! the same `(status, attempts)` condition. Leasing uses
//! `FOR UPDATE SKIP LOCKED`, letting concurrent workers pick distinct jobs
//! without blocking each other.

use crate::adapters::database::traits::{
    DailyStats, InsertOutcome, JobStore, MappingStore, QueueStats, StatsStore,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    daily_stats_from_row, job_from_row, mapping_from_row, output_from_row, source_from_row,
    to_sql_int,
};
use crate::core::encryption::EncryptedPayload;
use crate::core::mapping::MappingConfig;
use crate::domain::ids::{ClientId, MappingId, MessageId};
use crate::domain::job::{DeadLetterEntry, Job, JobOutput, JobVersion};
use crate::domain::{MedbridgeError, Result, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::sync::Arc;

const JOB_COLUMNS: &str = "message_id, sequence, client_id, mapping_id, source_data, \
    encryption_key_ref, priority, attempts, max_attempts, status, last_error, \
    created_at, visible_at, lease_expires_at, processed_at";

/// PostgreSQL implementation of [`JobStore`], [`MappingStore`] and [`StatsStore`]
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    /// Create a new PostgreSQL adapter
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Create a new PostgreSQL adapter with an Arc-wrapped client
    pub fn new_with_arc(client: Arc<PostgreSQLClient>) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }

    fn limit(limit: usize) -> i64 {
        i64::try_from(limit).unwrap_or(i64::MAX)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| MedbridgeError::Serialization(e.to_string()))
}

#[async_trait]
impl JobStore for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn insert_if_absent(&self, job: Job) -> Result<InsertOutcome> {
        let query = format!(
            r#"
            INSERT INTO jobs (
                message_id, client_id, mapping_id, source_data, encryption_key_ref,
                priority, attempts, max_attempts, status, last_error,
                created_at, visible_at, lease_expires_at, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (message_id) DO NOTHING
            RETURNING {JOB_COLUMNS}
            "#
        );

        let source_data = Value::Object(job.source_data.clone());
        let attempts = to_sql_int("attempts", job.attempts)?;
        let max_attempts = to_sql_int("max_attempts", job.max_attempts)?;

        let inserted = self
            .client
            .query_opt(
                &query,
                &[
                    &job.message_id.as_str(),
                    &job.client_id.as_str(),
                    &job.mapping_id.as_str(),
                    &source_data,
                    &job.encryption_key_ref,
                    &job.priority,
                    &attempts,
                    &max_attempts,
                    &job.status.as_str(),
                    &job.last_error,
                    &job.created_at,
                    &job.visible_at,
                    &job.lease_expires_at,
                    &job.processed_at,
                ],
            )
            .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(job_from_row(&row)?));
        }

        // Lost the race (or a duplicate): the existing row wins
        match JobStore::get(self, &job.message_id).await? {
            Some(existing) => Ok(InsertOutcome::Existing(existing)),
            None => Err(StoreError::Conflict(format!(
                "job {} conflicted on insert but could not be read back",
                job.message_id
            ))
            .into()),
        }
    }

    async fn get(&self, message_id: &MessageId) -> Result<Option<Job>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE message_id = $1");
        self.client
            .query_opt(&query, &[&message_id.as_str()])
            .await?
            .map(|row| job_from_row(&row))
            .transpose()
    }

    async fn compare_and_set(&self, expected: JobVersion, next: &Job) -> Result<bool> {
        let statement = r#"
            UPDATE jobs SET
                status = $4,
                attempts = $5,
                last_error = $6,
                visible_at = $7,
                lease_expires_at = $8,
                processed_at = $9
            WHERE message_id = $1 AND status = $2 AND attempts = $3
        "#;

        let expected_attempts = to_sql_int("attempts", expected.attempts)?;
        let next_attempts = to_sql_int("attempts", next.attempts)?;

        let updated = self
            .client
            .execute(
                statement,
                &[
                    &next.message_id.as_str(),
                    &expected.status.as_str(),
                    &expected_attempts,
                    &next.status.as_str(),
                    &next_attempts,
                    &next.last_error,
                    &next.visible_at,
                    &next.lease_expires_at,
                    &next.processed_at,
                ],
            )
            .await?;

        Ok(updated == 1)
    }

    async fn lease_next(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let query = format!(
            r#"
            UPDATE jobs SET status = 'active', lease_expires_at = $2
            WHERE message_id = (
                SELECT message_id FROM jobs
                WHERE status = 'waiting' AND visible_at <= $1
                ORDER BY priority DESC, sequence ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {JOB_COLUMNS}
            "#
        );

        self.client
            .query_opt(&query, &[&now, &lease_until])
            .await?
            .map(|row| job_from_row(&row))
            .transpose()
    }

    async fn expired_leases(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE status = 'active' AND lease_expires_at <= $1 \
             ORDER BY lease_expires_at ASC LIMIT $2"
        );
        let rows = self.client.query(&query, &[&now, &Self::limit(limit)]).await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn queue_stats(&self, now: DateTime<Utc>) -> Result<QueueStats> {
        let query = r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'active') AS active,
                COUNT(*) FILTER (WHERE status = 'waiting' AND visible_at <= $1) AS waiting,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'dead') AS failed,
                COUNT(*) FILTER (WHERE status = 'waiting' AND visible_at > $1) AS delayed
            FROM jobs
        "#;

        let rows = self.client.query(query, &[&now]).await?;
        let Some(row) = rows.first() else {
            return Ok(QueueStats::default());
        };

        let count = |name: &str| -> Result<u64> {
            let value: i64 = row
                .try_get(name)
                .map_err(|e| StoreError::CorruptRecord(format!("{name}: {e}")))?;
            Ok(u64::try_from(value).unwrap_or_default())
        };

        Ok(QueueStats {
            active: count("active")?,
            waiting: count("waiting")?,
            completed: count("completed")?,
            failed: count("failed")?,
            delayed: count("delayed")?,
        })
    }

    async fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>> {
        let query = format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'dead' \
             ORDER BY processed_at DESC, sequence DESC LIMIT $1"
        );
        let rows = self.client.query(&query, &[&Self::limit(limit)]).await?;
        rows.iter()
            .map(|row| job_from_row(row).map(|job| DeadLetterEntry::from_job(&job)))
            .collect()
    }

    async fn save_source(
        &self,
        expected: JobVersion,
        message_id: &MessageId,
        payload: &EncryptedPayload,
    ) -> Result<bool> {
        let statement = r#"
            WITH owner AS (
                SELECT message_id FROM jobs
                WHERE message_id = $1 AND status = $6 AND attempts = $7
                FOR UPDATE
            )
            INSERT INTO job_sources (message_id, ciphertext, iv, auth_tag, salt)
            SELECT message_id, $2, $3, $4, $5 FROM owner
            ON CONFLICT (message_id) DO UPDATE SET
                ciphertext = EXCLUDED.ciphertext,
                iv = EXCLUDED.iv,
                auth_tag = EXCLUDED.auth_tag,
                salt = EXCLUDED.salt,
                stored_at = NOW()
        "#;
        let expected_attempts = to_sql_int("attempts", expected.attempts)?;
        let written = self
            .client
            .execute(
                statement,
                &[
                    &message_id.as_str(),
                    &payload.ciphertext,
                    &payload.iv,
                    &payload.auth_tag,
                    &payload.salt,
                    &expected.status.as_str(),
                    &expected_attempts,
                ],
            )
            .await?;
        Ok(written == 1)
    }

    async fn load_source(&self, message_id: &MessageId) -> Result<Option<EncryptedPayload>> {
        self.client
            .query_opt(
                "SELECT ciphertext, iv, auth_tag, salt FROM job_sources WHERE message_id = $1",
                &[&message_id.as_str()],
            )
            .await?
            .map(|row| source_from_row(&row))
            .transpose()
    }

    async fn complete_with_output(
        &self,
        expected: JobVersion,
        completed: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        // One statement: the output row exists only if the job update matched
        let statement = r#"
            WITH completed AS (
                UPDATE jobs SET
                    status = $4,
                    attempts = $5,
                    last_error = $6,
                    visible_at = $7,
                    lease_expires_at = $8,
                    processed_at = $9
                WHERE message_id = $1 AND status = $2 AND attempts = $3
                RETURNING message_id
            )
            INSERT INTO job_outputs (message_id, transformed, errors, is_valid, processed_at)
            SELECT message_id, $10, $11, $12, $13 FROM completed
            ON CONFLICT (message_id) DO UPDATE SET
                transformed = EXCLUDED.transformed,
                errors = EXCLUDED.errors,
                is_valid = EXCLUDED.is_valid,
                processed_at = EXCLUDED.processed_at
        "#;

        let expected_attempts = to_sql_int("attempts", expected.attempts)?;
        let next_attempts = to_sql_int("attempts", completed.attempts)?;
        let errors = to_json(&output.errors)?;

        let written = self
            .client
            .execute(
                statement,
                &[
                    &completed.message_id.as_str(),
                    &expected.status.as_str(),
                    &expected_attempts,
                    &completed.status.as_str(),
                    &next_attempts,
                    &completed.last_error,
                    &completed.visible_at,
                    &completed.lease_expires_at,
                    &completed.processed_at,
                    &output.transformed,
                    &errors,
                    &output.is_valid,
                    &output.processed_at,
                ],
            )
            .await?;

        Ok(written == 1)
    }

    async fn load_output(&self, message_id: &MessageId) -> Result<Option<JobOutput>> {
        self.client
            .query_opt(
                "SELECT transformed, errors, is_valid, processed_at FROM job_outputs \
                 WHERE message_id = $1",
                &[&message_id.as_str()],
            )
            .await?
            .map(|row| output_from_row(&row))
            .transpose()
    }
}

#[async_trait]
impl MappingStore for PostgreSQLAdapter {
    async fn get(&self, mapping_id: &MappingId) -> Result<Option<MappingConfig>> {
        self.client
            .query_opt(
                "SELECT id, source_format, target_format, resource_type, defaults, rules \
                 FROM mappings WHERE id = $1",
                &[&mapping_id.as_str()],
            )
            .await?
            .map(|row| mapping_from_row(&row))
            .transpose()
    }

    async fn put(&self, config: MappingConfig) -> Result<()> {
        config.validate().map_err(MedbridgeError::Configuration)?;

        let statement = r#"
            INSERT INTO mappings (id, source_format, target_format, resource_type, defaults, rules)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                source_format = EXCLUDED.source_format,
                target_format = EXCLUDED.target_format,
                resource_type = EXCLUDED.resource_type,
                defaults = EXCLUDED.defaults,
                rules = EXCLUDED.rules,
                updated_at = NOW()
        "#;
        let defaults = Value::Object(config.defaults.clone());
        let rules = to_json(&config.rules)?;
        self.client
            .execute(
                statement,
                &[
                    &config.id.as_str(),
                    &config.source_format,
                    &config.target_format,
                    &config.resource_type,
                    &defaults,
                    &rules,
                ],
            )
            .await?;

        tracing::debug!(mapping_id = %config.id, "Mapping saved to PostgreSQL");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<MappingId>> {
        let rows = self
            .client
            .query("SELECT id FROM mappings ORDER BY id", &[])
            .await?;
        rows.iter()
            .map(|row| -> Result<MappingId> {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::CorruptRecord(format!("id: {e}")))?;
                MappingId::new(id).map_err(|e| StoreError::CorruptRecord(e).into())
            })
            .collect()
    }
}

#[async_trait]
impl StatsStore for PostgreSQLAdapter {
    async fn record_received(&self, client_id: &ClientId, date: NaiveDate) -> Result<()> {
        let statement = r#"
            INSERT INTO daily_stats (client_id, stat_date, received)
            VALUES ($1, $2, 1)
            ON CONFLICT (client_id, stat_date) DO UPDATE SET
                received = daily_stats.received + 1
        "#;
        self.client
            .execute(statement, &[&client_id.as_str(), &date])
            .await?;
        Ok(())
    }

    async fn record_processed(
        &self,
        client_id: &ClientId,
        date: NaiveDate,
        is_valid: bool,
        latency_ms: u64,
    ) -> Result<()> {
        let statement = r#"
            INSERT INTO daily_stats (client_id, stat_date, processed, failed, average_latency_ms)
            VALUES ($1, $2, 1, $3, $4)
            ON CONFLICT (client_id, stat_date) DO UPDATE SET
                processed = daily_stats.processed + 1,
                failed = daily_stats.failed + EXCLUDED.failed,
                average_latency_ms = daily_stats.average_latency_ms
                    + (EXCLUDED.average_latency_ms - daily_stats.average_latency_ms)
                    / (daily_stats.processed + 1)
        "#;
        let failed: i64 = if is_valid { 0 } else { 1 };
        let latency = latency_ms as f64;
        self.client
            .execute(
                statement,
                &[&client_id.as_str(), &date, &failed, &latency],
            )
            .await?;
        Ok(())
    }

    async fn record_dead(&self, client_id: &ClientId, date: NaiveDate) -> Result<()> {
        let statement = r#"
            INSERT INTO daily_stats (client_id, stat_date, failed)
            VALUES ($1, $2, 1)
            ON CONFLICT (client_id, stat_date) DO UPDATE SET
                failed = daily_stats.failed + 1
        "#;
        self.client
            .execute(statement, &[&client_id.as_str(), &date])
            .await?;
        Ok(())
    }

    async fn daily(&self, client_id: &ClientId, date: NaiveDate) -> Result<Option<DailyStats>> {
        self.client
            .query_opt(
                "SELECT client_id, stat_date, received, processed, failed, average_latency_ms \
                 FROM daily_stats WHERE client_id = $1 AND stat_date = $2",
                &[&client_id.as_str(), &date],
            )
            .await?
            .map(|row| daily_stats_from_row(&row))
            .transpose()
    }
}
