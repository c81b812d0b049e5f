//! Alert model
//!
//! Alerts are raised by the pipeline whenever a run produces mapping errors or
//! validation findings, and once when a job is dead-lettered.

use crate::domain::ids::{ClientId, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of problem the alert describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    ValidationError,
    ProcessingError,
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// An operator-facing alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub client_id: ClientId,
    pub message_id: MessageId,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    /// JSON detail payload, shape depends on the category
    pub details: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Alert for a run that completed with mapping errors or findings
    ///
    /// `details` carries the mapping errors and the structured findings
    /// (field, message, severity) as JSON. Severity is medium when any
    /// error-level problem is present, low when only warnings were produced.
    pub fn validation<F: Serialize>(
        client_id: ClientId,
        message_id: MessageId,
        mapping_errors: &[String],
        findings: &[F],
        has_errors: bool,
    ) -> Self {
        let severity = if has_errors {
            AlertSeverity::Medium
        } else {
            AlertSeverity::Low
        };
        let issues = mapping_errors.len() + findings.len();
        let details = serde_json::json!({
            "mappingErrors": mapping_errors,
            "findings": findings,
        });
        Self {
            title: format!("Validation issues for message {message_id}"),
            description: format!("{issues} issue(s) found while mapping and validating"),
            details: details.to_string(),
            client_id,
            message_id,
            category: AlertCategory::ValidationError,
            severity,
            resolved: false,
            created_at: Utc::now(),
        }
    }

    /// Alert for a job that exhausted its attempt budget
    pub fn dead_letter(
        client_id: ClientId,
        message_id: MessageId,
        reason: &str,
        attempts: u32,
    ) -> Self {
        Self {
            title: format!("Message {message_id} moved to dead letter"),
            description: format!("Processing failed after {attempts} attempt(s): {reason}"),
            details: serde_json::json!({ "reason": reason, "attempts": attempts }).to_string(),
            client_id,
            message_id,
            category: AlertCategory::ProcessingError,
            severity: AlertSeverity::High,
            resolved: false,
            created_at: Utc::now(),
        }
    }
}
