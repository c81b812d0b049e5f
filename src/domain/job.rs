//! Job domain model
//!
//! A job is one unit of submitted work tracked through a terminal outcome.
//! The broker is the only component that moves a job between states; the
//! `mark_*` methods here are the pure half of those transitions.

use crate::domain::ids::{ClientId, MappingId, MessageId};
use crate::domain::{MedbridgeError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Default attempt budget for a job
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Queue-level job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker (possibly delayed until `visible_at`)
    Waiting,
    /// Leased by a worker
    Active,
    /// Pipeline ran to completion
    Completed,
    /// Attempt budget exhausted
    Dead,
}

impl JobStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }

    /// Stable lowercase name used by stores
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Dead => "dead",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = MedbridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(MedbridgeError::Serialization(format!(
                "Unknown job status '{other}'"
            ))),
        }
    }
}

/// The `(status, attempts)` tuple every state transition is conditioned on
///
/// A worker that lost its lease holds a stale version, so its late report
/// fails the compare-and-set instead of overwriting newer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobVersion {
    pub status: JobStatus,
    pub attempts: u32,
}

/// Caller-visible status, as reported by the status service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalStatus {
    /// Waiting to run or waiting for a retry
    Queued,
    /// A worker holds the lease
    Processing,
    /// Ran to completion with a valid result
    Completed,
    /// Ran to completion but the output is invalid
    ///
    /// Warning-level findings alone leave the job `Completed`.
    Failed,
    /// Retry budget exhausted
    Dead,
}

impl ExternalStatus {
    /// Derive the caller-visible status from queue state and the stored output
    pub fn derive(status: JobStatus, output: Option<&JobOutput>) -> Self {
        match status {
            JobStatus::Waiting => Self::Queued,
            JobStatus::Active => Self::Processing,
            JobStatus::Dead => Self::Dead,
            JobStatus::Completed => match output {
                Some(out) if !out.is_valid => Self::Failed,
                _ => Self::Completed,
            },
        }
    }
}

/// A submission from the (external) API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Idempotency key; generated when absent
    #[serde(default)]
    pub message_id: Option<MessageId>,
    pub client_id: ClientId,
    pub mapping_id: MappingId,
    /// Proprietary record; must be a JSON object
    pub source_data: Value,
    /// Reference resolved by the key provider at processing time
    pub encryption_key_ref: String,
    /// Higher values are served first
    #[serde(default)]
    pub priority: i32,
}

/// Synchronous response to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub message_id: MessageId,
    pub status: ExternalStatus,
    /// False when the message ID already existed
    #[serde(skip)]
    pub created: bool,
}

/// A job tracked by the job store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub mapping_id: MappingId,
    pub source_data: Map<String, Value>,
    pub encryption_key_ref: String,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be leased
    pub visible_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Submission order, assigned by the store on insert
    pub sequence: u64,
}

impl Job {
    /// Build a waiting job from a submission
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when `source_data` is not a JSON object or the
    /// key reference is blank.
    pub fn from_submission(
        request: SubmitRequest,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let source_data = match request.source_data {
            Value::Object(map) => map,
            other => {
                return Err(MedbridgeError::InvalidInput(format!(
                    "sourceData must be an object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        if request.encryption_key_ref.trim().is_empty() {
            return Err(MedbridgeError::InvalidInput(
                "encryptionKeyRef cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            message_id: request.message_id.unwrap_or_else(MessageId::generate),
            client_id: request.client_id,
            mapping_id: request.mapping_id,
            source_data,
            encryption_key_ref: request.encryption_key_ref,
            priority: request.priority,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            status: JobStatus::Waiting,
            last_error: None,
            created_at: now,
            visible_at: now,
            lease_expires_at: None,
            processed_at: None,
            sequence: 0,
        })
    }

    /// Current compare-and-set version
    pub fn version(&self) -> JobVersion {
        JobVersion {
            status: self.status,
            attempts: self.attempts,
        }
    }

    /// Whether a worker may lease this job at `now`
    pub fn is_leasable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Waiting && self.visible_at <= now
    }

    /// Waiting but held back by a retry delay
    pub fn is_delayed(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Waiting && self.visible_at > now
    }

    /// Whether an active lease has run out at `now`
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active && self.lease_expires_at.is_some_and(|t| t <= now)
    }

    pub fn mark_active(&mut self, lease_until: DateTime<Utc>) {
        self.status = JobStatus::Active;
        self.lease_expires_at = Some(lease_until);
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.lease_expires_at = None;
        self.processed_at = Some(now);
    }

    /// Consume one attempt and wait until `visible_at` for the next one
    pub fn mark_retry(&mut self, reason: impl Into<String>, visible_at: DateTime<Utc>) {
        self.attempts += 1;
        self.status = JobStatus::Waiting;
        self.last_error = Some(reason.into());
        self.lease_expires_at = None;
        self.visible_at = visible_at;
    }

    /// Consume the final attempt
    pub fn mark_dead(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.attempts += 1;
        self.status = JobStatus::Dead;
        self.last_error = Some(reason.into());
        self.lease_expires_at = None;
        self.processed_at = Some(now);
    }

    /// Whether one more failure would exhaust the budget
    pub fn is_last_attempt(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Result of a pipeline run, persisted alongside the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutput {
    /// Mapped target record
    pub transformed: Value,
    /// Mapping errors followed by validation finding messages
    pub errors: Vec<String>,
    pub is_valid: bool,
    pub processed_at: DateTime<Utc>,
}

/// A dead-lettered job, for operator inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub job_id: String,
    pub message_id: MessageId,
    pub client_id: ClientId,
    pub failed_reason: String,
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
}

impl DeadLetterEntry {
    /// Build an entry from a dead job
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.sequence.to_string(),
            message_id: job.message_id.clone(),
            client_id: job.client_id.clone(),
            failed_reason: job.last_error.clone().unwrap_or_default(),
            failed_at: job.processed_at.unwrap_or(job.created_at),
            attempts: job.attempts,
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn request(source: Value) -> SubmitRequest {
        SubmitRequest {
            message_id: Some(MessageId::new("msg-1").unwrap()),
            client_id: ClientId::new("clinic-a").unwrap(),
            mapping_id: MappingId::new("patient-v1").unwrap(),
            source_data: source,
            encryption_key_ref: "default".to_string(),
            priority: 0,
        }
    }

    #[test]
    fn test_from_submission_starts_waiting() {
        let now = Utc::now();
        let job = Job::from_submission(request(json!({"id": "p1"})), 3, now).unwrap();
        assert_eq!(job.status, JobStatus::Waiting);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
        assert!(job.is_leasable(now));
        assert!(job.lease_expires_at.is_none());
    }

    #[test]
    fn test_from_submission_rejects_non_object() {
        let err = Job::from_submission(request(json!([1, 2])), 3, Utc::now()).unwrap_err();
        assert!(err.to_string().contains("sourceData must be an object, got array"));
    }

    #[test]
    fn test_from_submission_generates_message_id() {
        let mut req = request(json!({}));
        req.message_id = None;
        let job = Job::from_submission(req, 3, Utc::now()).unwrap();
        assert!(!job.message_id.as_str().is_empty());
    }

    #[test]
    fn test_retry_then_dead_transitions() {
        let now = Utc::now();
        let mut job = Job::from_submission(request(json!({})), 2, now).unwrap();

        job.mark_active(now + Duration::seconds(30));
        assert_eq!(job.status, JobStatus::Active);
        assert!(!job.is_last_attempt());

        job.mark_retry("boom", now + Duration::seconds(1));
        assert_eq!(job.version().attempts, 1);
        assert!(job.is_delayed(now));
        assert!(job.is_leasable(now + Duration::seconds(1)));

        job.mark_active(now + Duration::seconds(30));
        assert!(job.is_last_attempt());
        job.mark_dead("boom again", now);
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 2);
        assert!(job.status.is_terminal());
        assert_eq!(job.last_error.as_deref(), Some("boom again"));
    }

    #[test]
    fn test_lease_expired() {
        let now = Utc::now();
        let mut job = Job::from_submission(request(json!({})), 3, now).unwrap();
        job.mark_active(now + Duration::seconds(5));
        assert!(!job.lease_expired(now));
        assert!(job.lease_expired(now + Duration::seconds(5)));
    }

    #[test]
    fn test_external_status_derivation() {
        let output = JobOutput {
            transformed: json!({}),
            errors: vec!["name: at least one name is required".to_string()],
            is_valid: false,
            processed_at: Utc::now(),
        };
        assert_eq!(
            ExternalStatus::derive(JobStatus::Completed, Some(&output)),
            ExternalStatus::Failed
        );
        let warnings_only = JobOutput {
            errors: vec!["id: Patient id is missing".to_string()],
            is_valid: true,
            ..output.clone()
        };
        assert_eq!(
            ExternalStatus::derive(JobStatus::Completed, Some(&warnings_only)),
            ExternalStatus::Completed
        );
        assert_eq!(
            ExternalStatus::derive(JobStatus::Completed, None),
            ExternalStatus::Completed
        );
        assert_eq!(
            ExternalStatus::derive(JobStatus::Waiting, None),
            ExternalStatus::Queued
        );
        assert_eq!(
            serde_json::to_string(&ExternalStatus::Queued).unwrap(),
            "\"queued\""
        );
    }

    #[test]
    fn test_submit_request_camel_case() {
        let req: SubmitRequest = serde_json::from_value(json!({
            "clientId": "clinic-a",
            "mappingId": "patient-v1",
            "sourceData": {"id": "p1"},
            "encryptionKeyRef": "default"
        }))
        .unwrap();
        assert!(req.message_id.is_none());
        assert_eq!(req.priority, 0);
    }

    #[test]
    fn test_job_status_round_trip_names() {
        for status in [
            JobStatus::Waiting,
            JobStatus::Active,
            JobStatus::Completed,
            JobStatus::Dead,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }
}
