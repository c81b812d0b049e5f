//! One pipeline run: key -> mapping -> encrypt -> map -> validate -> commit
//!
//! [`JobRunner::run`] wraps a run with the job timeout and lease heartbeat,
//! reports the result to the broker, and fires the side channels.

use crate::core::encryption::check_key_length;
use crate::core::mapping::{MappingConfig, MappingEngine};
use crate::core::queue::{Broker, FailOutcome};
use crate::core::services::PipelineServices;
use crate::core::validation::{ValidationFinding, ValidatorRegistry};
use crate::domain::alert::Alert;
use crate::domain::job::{Job, JobOutput};
use crate::domain::{MedbridgeError, Result};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

/// How a run ended, from the worker's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Output persisted and the job completed
    Completed(JobOutput),
    /// The run failed and the broker applied the retry policy
    Failed {
        reason: String,
        outcome: FailOutcome,
    },
    /// The lease was lost mid-run; the result was discarded
    LeaseLost,
}

/// A mapped and validated record
///
/// `output.errors` is the flattened view; `mapping_errors` and `findings`
/// keep the structure behind it for alerting.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub output: JobOutput,
    pub mapping_errors: Vec<String>,
    pub findings: Vec<ValidationFinding>,
}

/// Map and validate one record
///
/// Errors are the mapping errors followed by the validation finding
/// messages. The output is valid only when the mapping was clean and no
/// error-level finding was raised.
pub fn transform_record(
    engine: &MappingEngine,
    validators: &ValidatorRegistry,
    source: &Map<String, Value>,
    mapping: &MappingConfig,
    now: DateTime<Utc>,
) -> Transformed {
    let mapped = engine.map(source, mapping);
    let kind = mapping.resource_kind(&mapped.target);
    let validation = validators.validate(&kind, &mapped.target);

    tracing::debug!(
        mapping_id = %mapping.id,
        resource_kind = %kind,
        mapping_errors = mapped.errors.len(),
        findings = validation.findings.len(),
        "Record transformed"
    );

    let is_valid = validation.is_valid && mapped.is_clean();
    let mut errors = mapped.errors.clone();
    errors.extend(validation.messages());

    Transformed {
        output: JobOutput {
            transformed: mapped.target,
            errors,
            is_valid,
            processed_at: now,
        },
        mapping_errors: mapped.errors,
        findings: validation.findings,
    }
}

/// Execute the pipeline for a leased job
///
/// The encrypted source is stored only while the job is still at the
/// version it was leased at. The output is returned, not stored; it is
/// committed together with the completion by [`Broker::complete`].
///
/// # Errors
///
/// Fails on an unknown or short key, a missing mapping, an encryption
/// failure, a store error, or [`MedbridgeError::LeaseLost`] when the job
/// moved on under this worker. Mapping and validation problems are not
/// errors; they land in [`JobOutput::errors`].
pub async fn execute(services: &PipelineServices, job: &Job) -> Result<Transformed> {
    let key = services.keys.resolve(&job.encryption_key_ref).await?;
    let key_bytes = key.expose_secret().as_bytes();
    check_key_length(key_bytes)?;

    let mapping = services
        .mappings
        .get(&job.mapping_id)
        .await?
        .ok_or_else(|| MedbridgeError::MappingNotFound(job.mapping_id.clone()))?;

    let plaintext = serde_json::to_vec(&job.source_data)?;
    let payload = services.encryption.encrypt(&plaintext, key_bytes)?;
    if !services
        .jobs
        .save_source(job.version(), &job.message_id, &payload)
        .await?
    {
        return Err(MedbridgeError::LeaseLost(job.message_id.clone()));
    }

    Ok(transform_record(
        &services.engine,
        &services.validators,
        &job.source_data,
        &mapping,
        Utc::now(),
    ))
}

/// Runs leased jobs to a reported outcome
#[derive(Clone)]
pub struct JobRunner {
    services: PipelineServices,
    broker: Broker,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(services: PipelineServices, broker: Broker, job_timeout: Duration) -> Self {
        Self {
            services,
            broker,
            job_timeout,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn services(&self) -> &PipelineServices {
        &self.services
    }

    /// Run `job` (already leased) and report the result
    ///
    /// The lease is renewed at half its duration while the run is in
    /// flight. A run that loses its lease is abandoned without reporting,
    /// and nothing it produced is stored.
    pub async fn run(&self, job: Job) -> Result<RunOutcome> {
        let started = Instant::now();
        let Some(result) = self.run_with_heartbeat(&job).await else {
            tracing::warn!(message_id = %job.message_id, "Lease lost mid-run, abandoning job");
            return Ok(RunOutcome::LeaseLost);
        };

        match result {
            Ok(transformed) => {
                if !self
                    .broker
                    .complete(&job, &transformed.output, Utc::now())
                    .await?
                {
                    return Ok(RunOutcome::LeaseLost);
                }
                let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                self.after_completion(&job, &transformed, latency_ms).await;
                Ok(RunOutcome::Completed(transformed.output))
            }
            Err(MedbridgeError::LeaseLost(_)) => {
                tracing::warn!(message_id = %job.message_id, "Job moved on before its source was stored");
                Ok(RunOutcome::LeaseLost)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    message_id = %job.message_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Pipeline run failed"
                );
                let outcome = self.broker.fail(&job, &reason, Utc::now()).await?;
                Ok(RunOutcome::Failed { reason, outcome })
            }
        }
    }

    /// `None` when the lease was lost before the run finished
    ///
    /// A renewal that errors is tolerated until the current lease expires;
    /// past that point another worker may hold the job.
    async fn run_with_heartbeat(&self, job: &Job) -> Option<Result<Transformed>> {
        let timeout_secs = self.job_timeout.as_secs();
        let run = async {
            match tokio::time::timeout(self.job_timeout, execute(&self.services, job)).await {
                Ok(result) => result,
                Err(_) => Err(MedbridgeError::Timeout(timeout_secs)),
            }
        };
        tokio::pin!(run);

        let period = (self.broker.lease_duration() / 2).max(Duration::from_millis(100));
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut lease_expires_at = job.lease_expires_at;

        loop {
            tokio::select! {
                result = &mut run => return Some(result),
                _ = heartbeat.tick() => {
                    match self.broker.renew_lease(job, Utc::now()).await {
                        Ok(Some(renewed)) => lease_expires_at = renewed.lease_expires_at,
                        Ok(None) => return None,
                        Err(e) => {
                            let now = Utc::now();
                            if !matches!(lease_expires_at, Some(expiry) if now < expiry) {
                                tracing::warn!(
                                    message_id = %job.message_id,
                                    error = %e,
                                    lease_expires_at = ?lease_expires_at,
                                    "Lease renewal failed after expiry"
                                );
                                return None;
                            }
                            tracing::warn!(message_id = %job.message_id, error = %e, "Lease renewal failed");
                        }
                    }
                }
            }
        }
    }

    async fn after_completion(&self, job: &Job, transformed: &Transformed, latency_ms: u64) {
        let output = &transformed.output;
        if !output.errors.is_empty() {
            let alert = Alert::validation(
                job.client_id.clone(),
                job.message_id.clone(),
                &transformed.mapping_errors,
                &transformed.findings,
                !output.is_valid,
            );
            if let Err(e) = self.services.alerts.emit(&alert).await {
                tracing::warn!(message_id = %job.message_id, error = %e, "Failed to emit validation alert");
            }
        }

        if let Err(e) = self
            .services
            .stats
            .record_processed(
                &job.client_id,
                output.processed_at.date_naive(),
                output.is_valid,
                latency_ms,
            )
            .await
        {
            tracing::warn!(message_id = %job.message_id, error = %e, "Failed to record processed stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::{seed_mappings, Stores};
    use crate::config::schema::{MappingsConfig, QueueConfig};
    use crate::config::secret_string;
    use crate::core::encryption::{ConfigKeyProvider, EncryptionService};
    use crate::core::mapping::{presets, MappingRule, ValueType};
    use crate::domain::alert::AlertSeverity;
    use crate::domain::job::SubmitRequest;
    use crate::domain::JobStatus;
    use crate::sinks::InMemoryAlertSink;
    use serde_json::json;
    use std::sync::Arc;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    async fn runner(alerts: Arc<InMemoryAlertSink>) -> JobRunner {
        let mut keys = ConfigKeyProvider::default();
        keys.insert("clinic-a", secret_string(KEY.to_string()));
        keys.insert("short", secret_string("too-short".to_string()));

        let stores = Stores::in_memory();
        seed_mappings(stores.mappings.as_ref(), &MappingsConfig::default())
            .await
            .unwrap();
        let services = PipelineServices::new(stores, Arc::new(keys)).with_alert_sink(alerts);
        let broker = Broker::new(&services, &QueueConfig::default());
        JobRunner::new(services, broker, Duration::from_secs(5))
    }

    async fn submit_and_lease(runner: &JobRunner, mapping: &str, key: &str, source: Value) -> Job {
        let request: SubmitRequest = serde_json::from_value(json!({
            "clientId": "clinic-a",
            "mappingId": mapping,
            "sourceData": source,
            "encryptionKeyRef": key
        }))
        .unwrap();
        runner.broker().submit(request, Utc::now()).await.unwrap();
        runner.broker().lease(Utc::now()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_valid_record_completes_without_alert() {
        let alerts = Arc::new(InMemoryAlertSink::new());
        let runner = runner(alerts.clone()).await;
        let job = submit_and_lease(
            &runner,
            presets::BODY_TEMPERATURE,
            "clinic-a",
            json!({"patientId": "p-1", "temperature": "37.2", "measuredAt": "2025-03-01"}),
        )
        .await;

        let RunOutcome::Completed(output) = runner.run(job.clone()).await.unwrap() else {
            panic!("expected completion");
        };
        assert!(output.is_valid, "{:?}", output.errors);
        assert_eq!(output.transformed["valueQuantity"]["value"], json!(37.2));
        assert_eq!(output.transformed["subject"]["reference"], "Patient/p-1");
        assert!(alerts.alerts().await.is_empty());

        let stored = runner.services.jobs.get(&job.message_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);

        // Source is stored encrypted and decrypts back to the submission
        let payload = runner
            .services
            .jobs
            .load_source(&job.message_id)
            .await
            .unwrap()
            .unwrap();
        let plaintext = runner
            .services
            .encryption
            .decrypt(&payload, KEY.as_bytes())
            .unwrap();
        let decoded: Map<String, Value> = serde_json::from_slice(&plaintext).unwrap();
        assert_eq!(decoded, job.source_data);
    }

    #[tokio::test]
    async fn test_invalid_record_completes_with_alert() {
        let alerts = Arc::new(InMemoryAlertSink::new());
        let runner = runner(alerts.clone()).await;
        let job = submit_and_lease(
            &runner,
            presets::BASIC_PATIENT,
            "clinic-a",
            json!({"id": "p-1", "gender": "F"}),
        )
        .await;

        let RunOutcome::Completed(output) = runner.run(job).await.unwrap() else {
            panic!("expected completion");
        };
        assert!(!output.is_valid);
        assert_eq!(output.errors[0], "Required field missing: familyName");

        let alerts = alerts.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
        let details: Value = serde_json::from_str(&alerts[0].details).unwrap();
        assert_eq!(
            details["mappingErrors"],
            json!(["Required field missing: familyName"])
        );
        assert_eq!(details["findings"][0]["field"], "name");
        assert_eq!(details["findings"][0]["severity"], "error");
    }

    #[tokio::test]
    async fn test_stale_holder_cannot_overwrite_completed_output() {
        let runner = runner(Arc::new(InMemoryAlertSink::new())).await;
        let source = json!({"id": "p-1", "familyName": "Silva", "gender": "F"});
        let first = submit_and_lease(&runner, presets::BASIC_PATIENT, "clinic-a", source).await;

        // The reaper gives the job to a second worker, which completes it
        let expiry = first.lease_expires_at.unwrap();
        assert_eq!(runner.broker().reap_expired(expiry).await.unwrap(), 1);
        let retry_at = runner
            .services
            .jobs
            .get(&first.message_id)
            .await
            .unwrap()
            .unwrap()
            .visible_at;
        let second = runner.broker().lease(retry_at).await.unwrap().unwrap();
        let RunOutcome::Completed(committed) = runner.run(second).await.unwrap() else {
            panic!("expected completion");
        };
        assert!(committed.is_valid);

        // Tighten the mapping so a rerun would produce a different output
        let mut tightened = presets::basic_patient();
        tightened
            .rules
            .push(MappingRule::new("mrn", "identifier.0.value", ValueType::String).required());
        runner.services.mappings.put(tightened).await.unwrap();

        assert!(matches!(
            execute(&runner.services, &first).await,
            Err(MedbridgeError::LeaseLost(_))
        ));
        assert_eq!(runner.run(first.clone()).await.unwrap(), RunOutcome::LeaseLost);

        let stored = runner.services.jobs.load_output(&first.message_id).await.unwrap().unwrap();
        assert_eq!(stored, committed);
        let job = runner.services.jobs.get(&first.message_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_short_key_is_a_failed_attempt() {
        let runner = runner(Arc::new(InMemoryAlertSink::new())).await;
        let job = submit_and_lease(&runner, presets::BASIC_PATIENT, "short", json!({"id": "p"})).await;

        let RunOutcome::Failed { reason, outcome } = runner.run(job).await.unwrap() else {
            panic!("expected failure");
        };
        assert!(reason.contains("too short"));
        assert!(matches!(outcome, FailOutcome::Retried { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_mapping_is_a_failed_attempt() {
        let runner = runner(Arc::new(InMemoryAlertSink::new())).await;
        let job = submit_and_lease(&runner, "no-such-mapping", "clinic-a", json!({})).await;

        let RunOutcome::Failed { reason, .. } = runner.run(job).await.unwrap() else {
            panic!("expected failure");
        };
        assert_eq!(reason, "Mapping not found: no-such-mapping");
    }

    #[test]
    fn test_transform_record_combines_errors_in_order() {
        let engine = MappingEngine::default();
        let validators = ValidatorRegistry::with_builtins();
        let source = json!({"gender": "X"});

        let Transformed {
            output,
            mapping_errors,
            findings,
        } = transform_record(
            &engine,
            &validators,
            source.as_object().unwrap(),
            &presets::basic_patient(),
            Utc::now(),
        );
        assert_eq!(mapping_errors.len(), 2);
        assert_eq!(findings.len(), 2);
        assert!(findings[0].is_error());
        assert!(!findings[1].is_error());
        assert_eq!(output.transformed["gender"], "unknown");
        assert!(!output.is_valid);
        assert_eq!(
            output.errors,
            vec![
                "Required field missing: id".to_string(),
                "Required field missing: familyName".to_string(),
                "name: Patient must have at least one name with family or given".to_string(),
                "id: Patient id is missing".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_required_source_invalidates_output() {
        let output = transform_record(
            &MappingEngine::default(),
            &ValidatorRegistry::with_builtins(),
            json!({"temperature": 37.0}).as_object().unwrap(),
            &presets::body_temperature(),
            Utc::now(),
        )
        .output;
        // patientId is required by the mapping, so the run is still invalid
        assert!(!output.is_valid);
        assert_eq!(output.errors[0], "Required field missing: patientId");
        assert!(output
            .errors
            .contains(&"subject.reference: Observation has no subject reference".to_string()));
    }
}
