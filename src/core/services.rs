//! Service handles shared by the broker, worker pool and status service
//!
//! Built once at startup and cloned into every task. Each field is a trait
//! object so tests can swap any collaborator.

use crate::adapters::database::{create_stores, JobStore, MappingStore, StatsStore, Stores};
use crate::config::schema::MedbridgeConfig;
use crate::core::encryption::{
    AesGcmEncryptionService, ConfigKeyProvider, EncryptionService, KeyProvider,
};
use crate::core::mapping::MappingEngine;
use crate::core::validation::ValidatorRegistry;
use crate::domain::Result;
use crate::sinks::{
    create_alert_sink, create_audit_sink, AlertSink, AuditSink, NoopAuditSink, TracingAlertSink,
};
use std::sync::Arc;

/// Every collaborator a pipeline run touches
#[derive(Clone)]
pub struct PipelineServices {
    pub jobs: Arc<dyn JobStore + Send + Sync>,
    pub mappings: Arc<dyn MappingStore + Send + Sync>,
    pub stats: Arc<dyn StatsStore + Send + Sync>,
    pub keys: Arc<dyn KeyProvider + Send + Sync>,
    pub encryption: Arc<dyn EncryptionService + Send + Sync>,
    pub alerts: Arc<dyn AlertSink + Send + Sync>,
    pub audit: Arc<dyn AuditSink + Send + Sync>,
    pub engine: Arc<MappingEngine>,
    pub validators: Arc<ValidatorRegistry>,
}

impl PipelineServices {
    /// Services over `stores` with the default engine, validators and cipher
    ///
    /// Alerts go to the log and the audit trail is off; use the `with_*`
    /// methods to replace either.
    pub fn new(stores: Stores, keys: Arc<dyn KeyProvider + Send + Sync>) -> Self {
        Self {
            jobs: stores.jobs,
            mappings: stores.mappings,
            stats: stores.stats,
            keys,
            encryption: Arc::new(AesGcmEncryptionService::new()),
            alerts: Arc::new(TracingAlertSink),
            audit: Arc::new(NoopAuditSink),
            engine: Arc::new(MappingEngine::default()),
            validators: Arc::new(ValidatorRegistry::with_builtins()),
        }
    }

    /// Build every service from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a store, sink or mapping source cannot be set up.
    pub async fn from_config(config: &MedbridgeConfig) -> Result<Self> {
        let stores = create_stores(config).await?;
        let keys = Arc::new(ConfigKeyProvider::from_config(&config.encryption));

        Ok(Self::new(stores, keys)
            .with_alert_sink(create_alert_sink(&config.alerts)?)
            .with_audit_sink(create_audit_sink(&config.audit)?))
    }

    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink + Send + Sync>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink + Send + Sync>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn EncryptionService + Send + Sync>) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_engine(mut self, engine: MappingEngine) -> Self {
        self.engine = Arc::new(engine);
        self
    }

    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = Arc::new(validators);
        self
    }
}
