//! Serve command implementation
//!
//! Runs the worker pool and lease reaper until a shutdown signal arrives.

use super::{connect_or_report, load_or_report};
use crate::core::worker::WorkerPool;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the number of concurrent workers
    #[arg(long)]
    pub concurrency: Option<usize>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting serve command");

        let mut config = match load_or_report(config_path) {
            Ok(c) => c,
            Err(code) => return Ok(code),
        };

        if let Some(concurrency) = self.concurrency {
            tracing::info!(concurrency, "Overriding worker concurrency from CLI");
            config.queue.concurrency = concurrency;
            if let Err(e) = config.validate() {
                println!("❌ Invalid --concurrency: {e}");
                return Ok(2);
            }
        }

        let services = match connect_or_report(&config).await {
            Ok(s) => s,
            Err(code) => return Ok(code),
        };

        println!(
            "🚀 MedBridge worker pool running ({} workers, {:?} store)",
            config.queue.concurrency, config.store_backend
        );
        println!("   Press Ctrl+C to stop");

        let pool = WorkerPool::new(services, &config.queue);
        let summary = pool.run(shutdown_signal).await?;

        println!();
        println!("📊 Worker Pool Summary");
        println!("   Completed: {}", summary.completed);
        println!("   Retried: {}", summary.retried);
        println!("   Dead-lettered: {}", summary.dead_lettered);
        println!("   Lease lost: {}", summary.lease_lost);
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serve_missing_config_is_config_error() {
        let args = ServeArgs { concurrency: None };
        let (_tx, rx) = watch::channel(false);
        let code = args.execute("does-not-exist.toml", rx).await.unwrap();
        assert_eq!(code, 2);
    }
}
