//! Integration tests for the broker state machine

mod common;

use chrono::{Duration, Utc};
use common::{fast_queue, harness, id, request, submit};
use medbridge::core::mapping::presets;
use medbridge::core::queue::{Broker, FailOutcome};
use medbridge::core::status::StatusService;
use medbridge::core::worker::WorkerPool;
use medbridge::domain::{AlertSeverity, ExternalStatus, JobStatus};
use medbridge::sinks::AuditEventKind;
use serde_json::json;
use std::collections::HashSet;

fn patient() -> serde_json::Value {
    json!({"id": "p1", "familyName": "Silva", "gender": "F"})
}

#[tokio::test]
async fn test_resubmission_never_duplicates_or_reruns() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());

    let first = submit(pool.broker(), request("msg-1", presets::BASIC_PATIENT, patient())).await;
    assert!(first.created);
    assert_eq!(first.status, ExternalStatus::Queued);

    let again = submit(pool.broker(), request("msg-1", presets::BASIC_PATIENT, json!({}))).await;
    assert!(!again.created);
    assert_eq!(again.status, ExternalStatus::Queued);

    let stats = h.services.jobs.queue_stats(Utc::now()).await.unwrap();
    assert_eq!(stats.waiting, 1);

    let summary = pool.drain().await.unwrap();
    assert_eq!(summary.completed, 1);

    // A terminal job is reported, not re-queued
    let after = submit(pool.broker(), request("msg-1", presets::BASIC_PATIENT, patient())).await;
    assert!(!after.created);
    assert_eq!(after.status, ExternalStatus::Completed);
    assert!(pool.broker().lease(Utc::now()).await.unwrap().is_none());

    let job = h.services.jobs.get(&id("msg-1")).await.unwrap().unwrap();
    assert_eq!(job.source_data["familyName"], "Silva");
}

#[tokio::test]
async fn test_retry_accounting_ends_in_single_dead_letter() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    submit(pool.broker(), request("doomed", "missing-mapping", json!({"a": 1}))).await;

    let summary = common::drain_all(&pool).await;
    assert_eq!(summary.retried, 2);
    assert_eq!(summary.dead_lettered, 1);

    let job = h.services.jobs.get(&id("doomed")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Dead);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.last_error.as_deref(), Some("Mapping not found: missing-mapping"));
    assert!(job.processed_at.is_some());

    let leases = h
        .audit
        .events()
        .await
        .into_iter()
        .filter(|e| e.event == AuditEventKind::Leased)
        .count();
    assert_eq!(leases, 3);

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::High);

    let status = StatusService::new(&h.services);
    let dead = status.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(dead[0].failed_reason, "Mapping not found: missing-mapping");

    let view = status.get_status(&id("doomed")).await.unwrap().unwrap();
    assert_eq!(view.status, ExternalStatus::Dead);

    let daily = status
        .daily_stats(&common::CLIENT.parse().unwrap(), Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(daily.received, 1);
    assert_eq!(daily.failed, 1);
    assert_eq!(daily.processed, 0);
}

#[tokio::test]
async fn test_backoff_delays_retry_visibility() {
    let h = harness().await;
    let broker = Broker::new(&h.services, &Default::default());
    submit(&broker, request("slow", presets::BASIC_PATIENT, patient())).await;

    let now = Utc::now();
    let job = broker.lease(now).await.unwrap().unwrap();
    let FailOutcome::Retried { attempts, visible_at } =
        broker.fail(&job, "boom", now).await.unwrap()
    else {
        panic!("expected retry");
    };
    assert_eq!(attempts, 1);
    assert_eq!(visible_at, now + Duration::milliseconds(2000));

    let stats = h.services.jobs.queue_stats(now).await.unwrap();
    assert_eq!(stats.delayed, 1);
    assert!(broker.lease(now).await.unwrap().is_none());

    // Second failure doubles the delay
    let job = broker.lease(visible_at).await.unwrap().unwrap();
    let FailOutcome::Retried { visible_at: second, .. } =
        broker.fail(&job, "boom", visible_at).await.unwrap()
    else {
        panic!("expected retry");
    };
    assert_eq!(second, visible_at + Duration::milliseconds(4000));
}

#[tokio::test]
async fn test_expired_lease_is_reaped_as_failure() {
    let h = harness().await;
    let broker = Broker::new(&h.services, &fast_queue());
    submit(&broker, request("abandoned", presets::BASIC_PATIENT, patient())).await;

    let now = Utc::now();
    let held = broker.lease(now).await.unwrap().unwrap();
    assert_eq!(broker.reap_expired(now).await.unwrap(), 0);

    let later = now + Duration::seconds(120);
    assert_eq!(broker.reap_expired(later).await.unwrap(), 1);

    let job = h.services.jobs.get(&id("abandoned")).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Waiting);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("lease expired"));

    // The original holder's late report is discarded
    let late = medbridge::domain::JobOutput {
        transformed: json!({}),
        errors: Vec::new(),
        is_valid: true,
        processed_at: later,
    };
    assert!(!broker.complete(&held, &late, later).await.unwrap());
    assert!(h.services.jobs.load_output(&id("abandoned")).await.unwrap().is_none());
    assert_eq!(
        broker.fail(&held, "late", later).await.unwrap(),
        FailOutcome::Stale
    );

    let events = h.audit.events().await;
    assert!(events.iter().any(|e| e.event == AuditEventKind::LeaseExpired));
}

#[tokio::test]
async fn test_priority_then_submission_order() {
    let h = harness().await;
    let broker = Broker::new(&h.services, &fast_queue());

    for (message_id, priority) in [("low-1", 0), ("high", 5), ("low-2", 0), ("mid", 2)] {
        let mut req = request(message_id, presets::BASIC_PATIENT, patient());
        req.priority = priority;
        submit(&broker, req).await;
    }

    let mut order = Vec::new();
    while let Some(job) = broker.lease(Utc::now()).await.unwrap() {
        order.push(job.message_id.to_string());
    }
    assert_eq!(order, vec!["high", "mid", "low-1", "low-2"]);
}

#[tokio::test]
async fn test_concurrent_leasing_hands_out_each_job_once() {
    let h = harness().await;
    let broker = Broker::new(&h.services, &fast_queue());
    for i in 0..50 {
        submit(&broker, request(&format!("job-{i}"), presets::BASIC_PATIENT, patient())).await;
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            let mut leased = Vec::new();
            while let Some(job) = broker.lease(Utc::now()).await.unwrap() {
                leased.push(job.message_id);
                tokio::task::yield_now().await;
            }
            leased
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for message_id in handle.await.unwrap() {
            assert!(seen.insert(message_id), "job leased twice");
        }
    }
    assert_eq!(seen.len(), 50);
}

#[tokio::test]
async fn test_racing_final_failures_alert_once() {
    let h = harness().await;
    let config = medbridge::config::QueueConfig {
        max_attempts: 1,
        ..fast_queue()
    };
    let broker = Broker::new(&h.services, &config);
    submit(&broker, request("race", presets::BASIC_PATIENT, patient())).await;

    let now = Utc::now();
    let job = broker.lease(now).await.unwrap().unwrap();
    let (a, b) = tokio::join!(
        broker.fail(&job, "worker failed", now),
        broker.reap_expired(now + Duration::seconds(120)),
    );

    let dead_by_fail = matches!(a.unwrap(), FailOutcome::DeadLettered { attempts: 1 });
    let dead_by_reaper = b.unwrap() == 1;
    assert!(dead_by_fail ^ dead_by_reaper);
    assert_eq!(h.alerts.alerts().await.len(), 1);
}
