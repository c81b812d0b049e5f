//! Alert sinks

use crate::config::schema::{AlertSinkKind, AlertsConfig};
use crate::domain::alert::{Alert, AlertSeverity};
use crate::domain::{MedbridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Destination for operator-facing alerts
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &Alert) -> Result<()>;
}

/// Emits alerts as structured log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            AlertSeverity::High | AlertSeverity::Critical => tracing::error!(
                message_id = %alert.message_id,
                client_id = %alert.client_id,
                category = ?alert.category,
                severity = ?alert.severity,
                details = %alert.details,
                "{}",
                alert.title
            ),
            AlertSeverity::Medium => tracing::warn!(
                message_id = %alert.message_id,
                client_id = %alert.client_id,
                category = ?alert.category,
                details = %alert.details,
                "{}",
                alert.title
            ),
            AlertSeverity::Low => tracing::info!(
                message_id = %alert.message_id,
                client_id = %alert.client_id,
                category = ?alert.category,
                details = %alert.details,
                "{}",
                alert.title
            ),
        }
        Ok(())
    }
}

/// Keeps alerts in memory for later inspection
#[derive(Debug, Default)]
pub struct InMemoryAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every alert emitted so far
    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for InMemoryAlertSink {
    async fn emit(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook
pub struct WebhookAlertSink {
    client: Client,
    url: String,
}

impl WebhookAlertSink {
    /// Create a webhook sink
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| MedbridgeError::Alert(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn emit(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| MedbridgeError::Alert(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MedbridgeError::Alert(format!(
                "Webhook returned HTTP {status}"
            )));
        }

        tracing::debug!(message_id = %alert.message_id, "Alert delivered to webhook");
        Ok(())
    }
}

/// Build the sink selected by `[alerts]`
pub fn create_alert_sink(config: &AlertsConfig) -> Result<Arc<dyn AlertSink + Send + Sync>> {
    match config.sink {
        AlertSinkKind::Log => Ok(Arc::new(TracingAlertSink) as Arc<dyn AlertSink + Send + Sync>),
        AlertSinkKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                MedbridgeError::Configuration(
                    "alerts.webhook_url is required for the webhook sink".to_string(),
                )
            })?;
            tracing::info!(url = %url, "Alerts will be delivered to webhook");
            let sink = WebhookAlertSink::new(url, Duration::from_secs(config.timeout_seconds))?;
            Ok(Arc::new(sink) as Arc<dyn AlertSink + Send + Sync>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{ClientId, MessageId};

    fn alert() -> Alert {
        Alert::dead_letter(
            ClientId::new("clinic-a").unwrap(),
            MessageId::new("msg-1").unwrap(),
            "boom",
            3,
        )
    }

    #[tokio::test]
    async fn test_in_memory_sink_records() {
        let sink = InMemoryAlertSink::new();
        sink.emit(&alert()).await.unwrap();
        let alerts = sink.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        assert!(TracingAlertSink.emit(&alert()).await.is_ok());
    }

    #[test]
    fn test_webhook_sink_requires_url() {
        let config = AlertsConfig {
            sink: AlertSinkKind::Webhook,
            webhook_url: None,
            timeout_seconds: 5,
        };
        assert!(create_alert_sink(&config).is_err());
    }
}
