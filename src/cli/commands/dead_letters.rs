//! Dead-letters command implementation

use super::{connect_or_report, load_or_report};
use crate::core::status::StatusService;
use clap::Args;

/// Arguments for the dead-letters command
#[derive(Args, Debug)]
pub struct DeadLettersArgs {
    /// Maximum number of entries, most recent first
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

impl DeadLettersArgs {
    /// Execute the dead-letters command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(limit = self.limit, "Listing dead letters");

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        let services = match connect_or_report(&config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };

        let entries = StatusService::new(&services)
            .dead_letters(self.limit)
            .await?;
        if entries.is_empty() {
            println!("No dead-lettered messages.");
            return Ok(0);
        }

        println!("Found {} dead-lettered message(s):", entries.len());
        println!();
        println!(
            "{:<38} {:<20} {:<8} {:<20} {}",
            "Message ID", "Client", "Attempts", "Failed At", "Reason"
        );
        println!("{}", "-".repeat(120));
        for entry in entries {
            println!(
                "{:<38} {:<20} {:<8} {:<20} {}",
                entry.message_id,
                entry.client_id,
                entry.attempts,
                entry.failed_at.format("%Y-%m-%d %H:%M:%S"),
                entry.failed_reason
            );
        }
        println!();
        Ok(0)
    }
}
