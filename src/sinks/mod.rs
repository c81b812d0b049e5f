//! Best-effort side channels: alerts and the audit trail
//!
//! Sinks observe pipeline state changes but never drive them. Callers log
//! and swallow sink errors; a failing webhook or a full disk never aborts
//! or retries a job.

pub mod alert;
pub mod audit;

pub use alert::{
    create_alert_sink, AlertSink, InMemoryAlertSink, TracingAlertSink, WebhookAlertSink,
};
pub use audit::{
    create_audit_sink, source_digest, AuditEvent, AuditEventKind, AuditSink, FileAuditSink,
    InMemoryAuditSink, NoopAuditSink,
};
