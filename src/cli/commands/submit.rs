//! Submit command implementation
//!
//! Reads a submission document from a JSON file and enqueues it. With
//! `--wait` the queue is drained in-process and the final status printed.

use super::{connect_or_report, load_or_report};
use crate::config::StoreBackend;
use crate::core::status::StatusService;
use crate::core::worker::WorkerPool;
use crate::domain::ids::MessageId;
use crate::domain::job::SubmitRequest;
use chrono::Utc;
use clap::Args;
use std::fs;

/// Arguments for the submit command
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// JSON file with `clientId`, `mappingId`, `sourceData` and `encryptionKeyRef`
    #[arg(short, long)]
    pub file: String,

    /// Idempotency key (overrides `messageId` in the file)
    #[arg(long)]
    pub message_id: Option<String>,

    /// Process the queue in-process and print the final status
    #[arg(long)]
    pub wait: bool,
}

impl SubmitArgs {
    /// Execute the submit command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(file = %self.file, "Submitting record");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        let mut request = match read_request(&self.file) {
            Ok(r) => r,
            Err(e) => {
                println!("❌ Invalid submission file {}", self.file);
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        if let Some(raw) = &self.message_id {
            match MessageId::new(raw) {
                Ok(id) => request.message_id = Some(id),
                Err(e) => {
                    println!("❌ Invalid --message-id: {e}");
                    return Ok(2);
                }
            }
        }

        if config.store_backend == StoreBackend::Memory && !self.wait {
            tracing::warn!("In-memory store without --wait: the job is lost when this command exits");
        }

        let services = match connect_or_report(&config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };
        let status = StatusService::new(&services);
        let pool = WorkerPool::new(services, &config.queue);

        let receipt = pool.broker().submit(request, Utc::now()).await?;
        if receipt.created {
            println!("✅ Submitted message {}", receipt.message_id);
        } else {
            println!("ℹ️  Message {} already exists", receipt.message_id);
        }
        println!("{}", serde_json::to_string_pretty(&receipt)?);

        if self.wait {
            let summary = pool.drain().await?;
            tracing::info!(processed = summary.total(), "Queue drained");
            if let Some(view) = status.get_status(&receipt.message_id).await? {
                println!();
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }

        Ok(0)
    }
}

fn read_request(path: &str) -> anyhow::Result<SubmitRequest> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
