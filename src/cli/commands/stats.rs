//! Stats command implementation
//!
//! Prints queue counters and, for a client, the daily statistics.

use super::{connect_or_report, load_or_report};
use crate::core::status::StatusService;
use crate::domain::ids::ClientId;
use chrono::{NaiveDate, Utc};
use clap::Args;

/// Arguments for the stats command
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Client whose daily statistics to show
    #[arg(long)]
    pub client_id: Option<String>,

    /// Day to report (YYYY-MM-DD, defaults to today in UTC)
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

impl StatsArgs {
    /// Execute the stats command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Collecting queue statistics");

        let client_id = match self.client_id.as_deref().map(ClientId::new).transpose() {
            Ok(id) => id,
            Err(e) => {
                println!("❌ Invalid client ID: {e}");
                return Ok(2);
            }
        };

        let config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };
        let services = match connect_or_report(&config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };
        let status = StatusService::new(&services);

        let queue = status.queue_stats().await?;
        println!("📊 Queue");
        println!("   Active: {}", queue.active);
        println!("   Waiting: {}", queue.waiting);
        println!("   Delayed: {}", queue.delayed);
        println!("   Completed: {}", queue.completed);
        println!("   Failed (dead): {}", queue.failed);

        if let Some(client_id) = client_id {
            let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
            let daily = status.daily_stats(&client_id, date).await?;
            println!();
            println!("📅 {} on {}", daily.client_id, daily.date);
            println!("   Received: {}", daily.received);
            println!("   Processed: {}", daily.processed);
            println!("   Failed: {}", daily.failed);
            println!("   Average latency: {:.1} ms", daily.average_latency_ms);
        }

        Ok(0)
    }
}
