//! Row conversions for the PostgreSQL store
//!
//! Column names match `migrations/001_pipeline_schema.sql`. Identifiers and
//! enums are stored as text and re-validated on the way out, so a hand-edited
//! row surfaces as [`StoreError::CorruptRecord`] instead of a panic.

use crate::adapters::database::traits::DailyStats;
use crate::core::encryption::EncryptedPayload;
use crate::core::mapping::{MappingConfig, MappingRule};
use crate::domain::ids::{ClientId, MappingId, MessageId};
use crate::domain::job::{Job, JobOutput, JobStatus};
use crate::domain::{Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name)
        .map_err(|e| StoreError::CorruptRecord(format!("column '{name}': {e}")).into())
}

fn corrupt(what: &str, reason: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRecord(format!("{what}: {reason}"))
}

fn non_negative(name: &str, value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| corrupt(name, format!("negative value {value}")).into())
}

/// Decode a `jobs` row
pub fn job_from_row(row: &Row) -> Result<Job> {
    let message_id: String = column(row, "message_id")?;
    let client_id: String = column(row, "client_id")?;
    let mapping_id: String = column(row, "mapping_id")?;
    let status: String = column(row, "status")?;
    let sequence: i64 = column(row, "sequence")?;

    let source_data = match column::<Value>(row, "source_data")? {
        Value::Object(map) => map,
        _ => return Err(corrupt("source_data", "not an object").into()),
    };

    Ok(Job {
        message_id: MessageId::new(message_id).map_err(|e| corrupt("message_id", e))?,
        client_id: ClientId::new(client_id).map_err(|e| corrupt("client_id", e))?,
        mapping_id: MappingId::new(mapping_id).map_err(|e| corrupt("mapping_id", e))?,
        source_data,
        encryption_key_ref: column(row, "encryption_key_ref")?,
        priority: column(row, "priority")?,
        attempts: non_negative("attempts", column(row, "attempts")?)?,
        max_attempts: non_negative("max_attempts", column(row, "max_attempts")?)?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| corrupt("status", e))?,
        last_error: column(row, "last_error")?,
        created_at: column(row, "created_at")?,
        visible_at: column(row, "visible_at")?,
        lease_expires_at: column(row, "lease_expires_at")?,
        processed_at: column(row, "processed_at")?,
        sequence: u64::try_from(sequence).map_err(|e| corrupt("sequence", e))?,
    })
}

/// Decode a `job_sources` row
pub fn source_from_row(row: &Row) -> Result<EncryptedPayload> {
    Ok(EncryptedPayload {
        ciphertext: column(row, "ciphertext")?,
        iv: column(row, "iv")?,
        auth_tag: column(row, "auth_tag")?,
        salt: column(row, "salt")?,
    })
}

/// Decode a `job_outputs` row
pub fn output_from_row(row: &Row) -> Result<JobOutput> {
    let errors: Value = column(row, "errors")?;
    let processed_at: DateTime<Utc> = column(row, "processed_at")?;
    Ok(JobOutput {
        transformed: column(row, "transformed")?,
        errors: serde_json::from_value(errors).map_err(|e| corrupt("errors", e))?,
        is_valid: column(row, "is_valid")?,
        processed_at,
    })
}

/// Decode a `mappings` row
pub fn mapping_from_row(row: &Row) -> Result<MappingConfig> {
    let id: String = column(row, "id")?;
    let defaults = match column::<Value>(row, "defaults")? {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        _ => return Err(corrupt("defaults", "not an object").into()),
    };
    let rules: Vec<MappingRule> =
        serde_json::from_value(column(row, "rules")?).map_err(|e| corrupt("rules", e))?;

    Ok(MappingConfig {
        id: MappingId::new(id).map_err(|e| corrupt("id", e))?,
        source_format: column(row, "source_format")?,
        target_format: column(row, "target_format")?,
        resource_type: column(row, "resource_type")?,
        defaults,
        rules,
    })
}

/// Decode a `daily_stats` row
pub fn daily_stats_from_row(row: &Row) -> Result<DailyStats> {
    let client_id: String = column(row, "client_id")?;
    let date: NaiveDate = column(row, "stat_date")?;
    let counter = |name: &str| -> Result<u64> {
        let value: i64 = column(row, name)?;
        u64::try_from(value).map_err(|e| corrupt(name, e).into())
    };

    Ok(DailyStats {
        client_id: ClientId::new(client_id).map_err(|e| corrupt("client_id", e))?,
        date,
        received: counter("received")?,
        processed: counter("processed")?,
        failed: counter("failed")?,
        average_latency_ms: column(row, "average_latency_ms")?,
    })
}

/// Convert an unsigned counter for an `INTEGER` column
pub fn to_sql_int(name: &str, value: u32) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::QueryFailed(format!("{name} {value} out of range")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_negative_rejects_negative_counts() {
        assert_eq!(non_negative("attempts", 2).unwrap(), 2);
        let err = non_negative("attempts", -1).unwrap_err();
        assert!(err.to_string().contains("Corrupt record: attempts"));
    }

    #[test]
    fn test_to_sql_int_range() {
        assert_eq!(to_sql_int("attempts", 3).unwrap(), 3);
        assert!(to_sql_int("attempts", u32::MAX).is_err());
    }
}
