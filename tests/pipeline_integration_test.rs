//! End-to-end pipeline runs against in-memory stores

mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{drain_all, fast_queue, harness, id, request, submit, KEY};
use medbridge::adapters::database::{InsertOutcome, JobStore, QueueStats};
use medbridge::adapters::memory::InMemoryJobStore;
use medbridge::config::{secret_string, SecretString};
use medbridge::core::encryption::{EncryptedPayload, EncryptionService, KeyProvider};
use medbridge::core::mapping::{
    presets, MappingConfig, MappingEngine, MappingRule, TransformRegistry, ValueType,
};
use medbridge::core::queue::{Broker, FailOutcome};
use medbridge::core::status::StatusService;
use medbridge::core::validation::{ValidationFinding, ValidatorRegistry};
use medbridge::core::worker::{JobRunner, RunOutcome, WorkerPool};
use medbridge::domain::{
    AlertCategory, AlertSeverity, DeadLetterEntry, EncryptionError, ExternalStatus, Job,
    JobOutput, JobStatus, JobVersion, MappingId, MessageId, StoreError,
};
use medbridge::sinks::{source_digest, AuditEventKind};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[tokio::test]
async fn test_pool_runs_mixed_batch_to_terminal_states() {
    let h = harness().await;
    let config = medbridge::config::QueueConfig {
        concurrency: 4,
        ..fast_queue()
    };
    let pool = Arc::new(WorkerPool::new(h.services.clone(), &config));

    for i in 0..6 {
        let source = json!({"patientId": format!("p-{i}"), "temperature": 36.5 + f64::from(i) / 10.0});
        submit(pool.broker(), request(&format!("temp-{i}"), presets::BODY_TEMPERATURE, source)).await;
    }
    submit(pool.broker(), request("incomplete", presets::BASIC_PATIENT, json!({"id": "p-9"}))).await;
    submit(pool.broker(), request("unmapped", "no-such-mapping", json!({"x": 1}))).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run(shutdown_rx).await }
    });

    let status = StatusService::new(&h.services);
    for _ in 0..500 {
        let stats = status.queue_stats().await.unwrap();
        if stats.completed + stats.failed == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown_tx.send(true).unwrap();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.completed, 7);
    assert_eq!(summary.dead_lettered, 1);
    assert_eq!(summary.retried, 2);

    for i in 0..6 {
        let view = status.get_status(&id(&format!("temp-{i}"))).await.unwrap().unwrap();
        assert_eq!(view.status, ExternalStatus::Completed, "{:?}", view.errors);
    }
    let incomplete = status.get_status(&id("incomplete")).await.unwrap().unwrap();
    assert_eq!(incomplete.status, ExternalStatus::Failed);
    let unmapped = status.get_status(&id("unmapped")).await.unwrap().unwrap();
    assert_eq!(unmapped.status, ExternalStatus::Dead);

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 2);
    assert!(alerts
        .iter()
        .any(|a| a.category == AlertCategory::ValidationError && a.severity == AlertSeverity::Medium));
    assert!(alerts
        .iter()
        .any(|a| a.category == AlertCategory::ProcessingError && a.severity == AlertSeverity::High));
}

#[tokio::test]
async fn test_gender_normalized_and_patient_valid() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    let source = json!({
        "id": "p-1",
        "gender": "Feminino",
        "familyName": "Silva",
        "givenName": "Ana",
        "birthDate": "07/03/1985",
        "phone": 11987654321u64
    });
    submit(pool.broker(), request("patient-1", presets::BASIC_PATIENT, source)).await;
    pool.drain().await.unwrap();

    let output = h.services.jobs.load_output(&id("patient-1")).await.unwrap().unwrap();
    assert!(output.is_valid, "{:?}", output.errors);
    assert!(output.errors.is_empty());
    assert_eq!(output.transformed["gender"], "female");
    assert_eq!(output.transformed["name"][0]["family"], "Silva");
    assert_eq!(output.transformed["name"][0]["given"][0], "Ana");
    assert_eq!(output.transformed["birthDate"], "1985-03-07");
    assert_eq!(output.transformed["telecom"][0]["value"], "11987654321");
    assert!(h.alerts.alerts().await.is_empty());
}

#[tokio::test]
async fn test_numeric_strings_are_coerced() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    submit(
        pool.broker(),
        request(
            "celsius",
            presets::BODY_TEMPERATURE,
            json!({"patientId": 42, "temperature": " 37.8 "}),
        ),
    )
    .await;
    submit(
        pool.broker(),
        request(
            "fahrenheit",
            presets::BODY_TEMPERATURE,
            json!({"patientId": "p-2", "temperatureF": "100.4"}),
        ),
    )
    .await;
    pool.drain().await.unwrap();

    let celsius = h.services.jobs.load_output(&id("celsius")).await.unwrap().unwrap();
    assert!(celsius.is_valid, "{:?}", celsius.errors);
    assert_eq!(celsius.transformed["valueQuantity"]["value"], json!(37.8));
    assert_eq!(celsius.transformed["subject"]["reference"], "Patient/42");

    let fahrenheit = h.services.jobs.load_output(&id("fahrenheit")).await.unwrap().unwrap();
    assert_eq!(fahrenheit.transformed["valueQuantity"]["value"], json!(38.0));
}

#[tokio::test]
async fn test_unparseable_number_fails_the_record() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    submit(
        pool.broker(),
        request(
            "garbled",
            presets::BODY_TEMPERATURE,
            json!({"patientId": "p-3", "temperature": "warm"}),
        ),
    )
    .await;
    let summary = pool.drain().await.unwrap();
    assert_eq!(summary.completed, 1);

    let view = StatusService::new(&h.services)
        .get_status(&id("garbled"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, ExternalStatus::Failed);
    assert_eq!(
        view.errors,
        vec!["Error mapping field temperature: 'warm' is not a number".to_string()]
    );
}

#[tokio::test]
async fn test_patient_findings_follow_mapping_errors() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    submit(
        pool.broker(),
        request("nameless", presets::BASIC_PATIENT, json!({"gender": "m"})),
    )
    .await;
    pool.drain().await.unwrap();

    let output = h.services.jobs.load_output(&id("nameless")).await.unwrap().unwrap();
    assert!(!output.is_valid);
    assert_eq!(output.errors[0], "Required field missing: id");
    assert_eq!(output.errors[1], "Required field missing: familyName");
    assert!(output
        .errors
        .contains(&"name: Patient must have at least one name with family or given".to_string()));

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Medium);
}

#[tokio::test]
async fn test_warning_only_patient_stays_completed() {
    let h = harness().await;
    let mut defaults = Map::new();
    defaults.insert("resourceType".into(), json!("Patient"));
    h.services
        .mappings
        .put(MappingConfig {
            id: MappingId::new("clinic-a-patient").unwrap(),
            source_format: "clinic-a-demographics".into(),
            target_format: "Patient".into(),
            resource_type: Some("Patient".into()),
            defaults,
            rules: vec![
                MappingRule::new("surname", "name.0.family", ValueType::String).required(),
                MappingRule::new("sex", "gender", ValueType::Code).with_transform("gender"),
            ],
        })
        .await
        .unwrap();

    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    submit(
        pool.broker(),
        request("anonymous", "clinic-a-patient", json!({"surname": "Costa", "sex": "F"})),
    )
    .await;
    pool.drain().await.unwrap();

    let view = StatusService::new(&h.services)
        .get_status(&id("anonymous"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.status, ExternalStatus::Completed);
    assert_eq!(view.errors, vec!["id: Patient id is missing".to_string()]);

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Low);
    let details: Value = serde_json::from_str(&alerts[0].details).unwrap();
    assert_eq!(details["mappingErrors"], json!([]));
    assert_eq!(
        details["findings"],
        json!([{"field": "id", "message": "Patient id is missing", "severity": "warning"}])
    );
}

#[tokio::test]
async fn test_custom_transform_and_validator() {
    let h = harness().await;

    let mut transforms = TransformRegistry::with_builtins();
    transforms.register("mmhg", |v| {
        v.as_str()
            .and_then(|s| s.strip_suffix("mmHg"))
            .and_then(|s| s.trim().parse::<f64>().ok())
            .map(Value::from)
            .ok_or_else(|| "expected '<n> mmHg'".to_string())
    });
    let mut validators = ValidatorRegistry::with_builtins();
    validators.register("Observation", |record| {
        match record.pointer("/valueQuantity/value").and_then(Value::as_f64) {
            Some(v) if v > 300.0 => vec![ValidationFinding::error("valueQuantity.value", "Implausible pressure")],
            _ => Vec::new(),
        }
    });
    let services = h
        .services
        .clone()
        .with_engine(MappingEngine::new(Arc::new(transforms)))
        .with_validators(validators);

    let mut defaults = Map::new();
    defaults.insert("resourceType".into(), json!("Observation"));
    defaults.insert("status".into(), json!("final"));
    defaults.insert("code".into(), json!({"text": "Systolic blood pressure"}));
    services
        .mappings
        .put(MappingConfig {
            id: MappingId::new("clinic-a-systolic").unwrap(),
            source_format: "clinic-a-bp".into(),
            target_format: "Observation".into(),
            resource_type: None,
            defaults,
            rules: vec![
                MappingRule::new("patient.id", "subject.reference", ValueType::String)
                    .with_transform("patient_reference")
                    .required(),
                MappingRule::new("readings.systolic", "valueQuantity.value", ValueType::Number)
                    .with_transform("mmhg"),
            ],
        })
        .await
        .unwrap();

    let pool = WorkerPool::new(services.clone(), &fast_queue());
    submit(
        pool.broker(),
        request(
            "bp-ok",
            "clinic-a-systolic",
            json!({"patient": {"id": "p-7"}, "readings": {"systolic": "120 mmHg"}}),
        ),
    )
    .await;
    submit(
        pool.broker(),
        request(
            "bp-high",
            "clinic-a-systolic",
            json!({"patient": {"id": "p-8"}, "readings": {"systolic": "420 mmHg"}}),
        ),
    )
    .await;
    pool.drain().await.unwrap();

    let ok = services.jobs.load_output(&id("bp-ok")).await.unwrap().unwrap();
    assert!(ok.is_valid, "{:?}", ok.errors);
    assert_eq!(ok.transformed["valueQuantity"]["value"], json!(120.0));
    assert_eq!(ok.transformed["subject"]["reference"], "Patient/p-7");

    let high = services.jobs.load_output(&id("bp-high")).await.unwrap().unwrap();
    assert!(!high.is_valid);
    assert_eq!(high.errors, vec!["valueQuantity.value: Implausible pressure".to_string()]);
}

struct SlowKeys(Duration);

#[async_trait]
impl KeyProvider for SlowKeys {
    async fn resolve(&self, _key_ref: &str) -> Result<SecretString, EncryptionError> {
        tokio::time::sleep(self.0).await;
        Ok(secret_string(KEY.to_string()))
    }
}

/// Job store whose lease renewals never reach the backend
struct RenewalsUnreachable(InMemoryJobStore);

#[async_trait]
impl JobStore for RenewalsUnreachable {
    async fn test_connection(&self) -> medbridge::domain::Result<()> {
        self.0.test_connection().await
    }

    async fn insert_if_absent(&self, job: Job) -> medbridge::domain::Result<InsertOutcome> {
        self.0.insert_if_absent(job).await
    }

    async fn get(&self, message_id: &MessageId) -> medbridge::domain::Result<Option<Job>> {
        self.0.get(message_id).await
    }

    async fn compare_and_set(
        &self,
        expected: JobVersion,
        next: &Job,
    ) -> medbridge::domain::Result<bool> {
        if next.status == JobStatus::Active {
            return Err(StoreError::ConnectionFailed("connection reset".to_string()).into());
        }
        self.0.compare_and_set(expected, next).await
    }

    async fn lease_next(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> medbridge::domain::Result<Option<Job>> {
        self.0.lease_next(now, lease_until).await
    }

    async fn expired_leases(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> medbridge::domain::Result<Vec<Job>> {
        self.0.expired_leases(now, limit).await
    }

    async fn queue_stats(&self, now: DateTime<Utc>) -> medbridge::domain::Result<QueueStats> {
        self.0.queue_stats(now).await
    }

    async fn dead_letters(&self, limit: usize) -> medbridge::domain::Result<Vec<DeadLetterEntry>> {
        self.0.dead_letters(limit).await
    }

    async fn save_source(
        &self,
        expected: JobVersion,
        message_id: &MessageId,
        payload: &EncryptedPayload,
    ) -> medbridge::domain::Result<bool> {
        self.0.save_source(expected, message_id, payload).await
    }

    async fn load_source(
        &self,
        message_id: &MessageId,
    ) -> medbridge::domain::Result<Option<EncryptedPayload>> {
        self.0.load_source(message_id).await
    }

    async fn complete_with_output(
        &self,
        expected: JobVersion,
        completed: &Job,
        output: &JobOutput,
    ) -> medbridge::domain::Result<bool> {
        self.0.complete_with_output(expected, completed, output).await
    }

    async fn load_output(&self, message_id: &MessageId) -> medbridge::domain::Result<Option<JobOutput>> {
        self.0.load_output(message_id).await
    }
}

#[tokio::test]
async fn test_renewal_failing_past_expiry_abandons_run() {
    let h = harness().await;
    let mut services = h.services.clone();
    services.jobs = Arc::new(RenewalsUnreachable(InMemoryJobStore::new()));
    services.keys = Arc::new(SlowKeys(Duration::from_secs(5)));

    let config = medbridge::config::QueueConfig {
        lease_duration_secs: 1,
        ..fast_queue()
    };
    let broker = Broker::new(&services, &config);
    let runner = JobRunner::new(services.clone(), broker.clone(), Duration::from_secs(30));
    submit(
        &broker,
        request("stranded", presets::BODY_TEMPERATURE, json!({"patientId": "p", "temperature": 37})),
    )
    .await;

    let job = broker.lease(Utc::now()).await.unwrap().unwrap();
    let expiry = job.lease_expires_at.unwrap();
    let started = std::time::Instant::now();
    assert_eq!(runner.run(job).await.unwrap(), RunOutcome::LeaseLost);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(Utc::now() >= expiry);

    // Nothing was reported or stored; the reaper owns the job now
    let stored = services.jobs.get(&id("stranded")).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Active);
    assert_eq!(stored.attempts, 0);
    assert!(services.jobs.load_source(&id("stranded")).await.unwrap().is_none());
    assert!(services.jobs.load_output(&id("stranded")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_overrunning_job_times_out_as_failed_attempt() {
    let h = harness().await;
    let mut services = h.services.clone();
    services.keys = Arc::new(SlowKeys(Duration::from_millis(500)));

    let broker = Broker::new(&services, &fast_queue());
    let runner = JobRunner::new(services.clone(), broker.clone(), Duration::from_millis(50));
    submit(
        &broker,
        request("slow", presets::BODY_TEMPERATURE, json!({"patientId": "p", "temperature": 37})),
    )
    .await;

    let job = broker.lease(Utc::now()).await.unwrap().unwrap();
    let RunOutcome::Failed { reason, outcome } = runner.run(job).await.unwrap() else {
        panic!("expected a failed run");
    };
    assert!(reason.contains("timed out"), "{reason}");
    assert!(matches!(outcome, FailOutcome::Retried { attempts: 1, .. }));
    assert!(services.jobs.load_output(&id("slow")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_short_key_exhausts_retries() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    let mut req = request("weak", presets::BASIC_PATIENT, json!({"id": "p", "familyName": "X"}));
    req.encryption_key_ref = "short-key".to_string();
    submit(pool.broker(), req).await;

    let summary = drain_all(&pool).await;
    assert_eq!(summary.dead_lettered, 1);

    let job = h.services.jobs.get(&id("weak")).await.unwrap().unwrap();
    assert!(job
        .last_error
        .as_deref()
        .is_some_and(|e| e.contains("Encryption key too short")));
    assert!(h.services.jobs.load_source(&id("weak")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_source_encrypted_and_audit_carries_only_digest() {
    let h = harness().await;
    let pool = WorkerPool::new(h.services.clone(), &fast_queue());
    let source = json!({"id": "p-5", "familyName": "Confidencial", "gender": "o"});
    submit(pool.broker(), request("private", presets::BASIC_PATIENT, source.clone())).await;
    pool.drain().await.unwrap();

    let payload = h.services.jobs.load_source(&id("private")).await.unwrap().unwrap();
    assert!(!payload.ciphertext.contains("Confidencial"));
    let plaintext = h
        .services
        .encryption
        .decrypt(&payload, KEY.as_bytes())
        .unwrap();
    let decrypted: Value = serde_json::from_slice(&plaintext).unwrap();
    assert_eq!(decrypted, source);

    let events = h.audit.events().await;
    let kinds: Vec<_> = events.iter().map(|e| e.event).collect();
    assert_eq!(
        kinds,
        vec![
            AuditEventKind::Submitted,
            AuditEventKind::Leased,
            AuditEventKind::Completed
        ]
    );

    let expected = source_digest(source.as_object().unwrap());
    for event in &events {
        assert_eq!(event.source_digest, expected);
        let line = serde_json::to_string(event).unwrap();
        assert!(!line.contains("Confidencial"));
    }
}
