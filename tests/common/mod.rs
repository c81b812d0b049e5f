//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::Utc;
use medbridge::adapters::database::{seed_mappings, Stores};
use medbridge::config::schema::{MappingsConfig, QueueConfig};
use medbridge::config::secret_string;
use medbridge::core::encryption::ConfigKeyProvider;
use medbridge::core::queue::Broker;
use medbridge::core::services::PipelineServices;
use medbridge::core::worker::{PoolSummary, WorkerPool};
use medbridge::domain::{MessageId, SubmitReceipt, SubmitRequest};
use medbridge::sinks::{InMemoryAlertSink, InMemoryAuditSink};
use serde_json::{json, Value};
use std::sync::Arc;

pub const CLIENT: &str = "clinic-a";
pub const KEY: &str = "0123456789abcdef0123456789abcdef";

pub struct Harness {
    pub services: PipelineServices,
    pub alerts: Arc<InMemoryAlertSink>,
    pub audit: Arc<InMemoryAuditSink>,
}

/// In-memory services with built-in mappings, one valid key and one short key
pub async fn harness() -> Harness {
    let mut keys = ConfigKeyProvider::default();
    keys.insert(CLIENT, secret_string(KEY.to_string()));
    keys.insert("short-key", secret_string("short".to_string()));

    let stores = Stores::in_memory();
    seed_mappings(stores.mappings.as_ref(), &MappingsConfig::default())
        .await
        .expect("seed mappings");

    let alerts = Arc::new(InMemoryAlertSink::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let services = PipelineServices::new(stores, Arc::new(keys))
        .with_alert_sink(alerts.clone())
        .with_audit_sink(audit.clone());

    Harness {
        services,
        alerts,
        audit,
    }
}

/// Queue settings with a 1 ms retry delay
pub fn fast_queue() -> QueueConfig {
    QueueConfig {
        backoff_base_ms: 1,
        backoff_cap_ms: 1,
        poll_interval_ms: 10,
        ..QueueConfig::default()
    }
}

/// Drain until nothing is waiting, delayed or active
pub async fn drain_all(pool: &WorkerPool) -> PoolSummary {
    for _ in 0..500 {
        pool.drain().await.expect("drain");
        let stats = pool
            .services()
            .jobs
            .queue_stats(Utc::now())
            .await
            .expect("queue stats");
        if stats.waiting + stats.delayed + stats.active == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    pool.summary()
}

pub fn request(message_id: &str, mapping_id: &str, source: Value) -> SubmitRequest {
    serde_json::from_value(json!({
        "messageId": message_id,
        "clientId": CLIENT,
        "mappingId": mapping_id,
        "sourceData": source,
        "encryptionKeyRef": CLIENT
    }))
    .expect("valid request")
}

pub async fn submit(broker: &Broker, request: SubmitRequest) -> SubmitReceipt {
    broker.submit(request, Utc::now()).await.expect("submit")
}

pub fn id(raw: &str) -> MessageId {
    raw.parse().expect("message id")
}
