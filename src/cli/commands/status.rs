//! Status command implementation
//!
//! Prints the caller-facing status of one message.

use super::{connect_or_report, load_or_report};
use crate::core::status::StatusService;
use crate::domain::ids::MessageId;
use clap::Args;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Message ID to look up
    pub message_id: String,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(message_id = %self.message_id, "Checking message status");

        let message_id = match MessageId::new(&self.message_id) {
            Ok(id) => id,
            Err(e) => {
                println!("❌ Invalid message ID: {e}");
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

        match StatusService::new(&services).get_status(&message_id).await {
            Ok(Some(view)) => {
                println!("{}", serde_json::to_string_pretty(&view)?);
                Ok(0)
            }
            Ok(None) => {
                println!("❌ Message not found: {message_id}");
                Ok(3) // Not found exit code
            }
            Err(e) => {
                println!("❌ Failed to load status");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_unknown_message_exit_code() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("medbridge.toml");
        std::fs::write(&config_path, "").unwrap();

        let args = StatusArgs {
            message_id: "unknown".to_string(),
        };
        let code = args.execute(config_path.to_str().unwrap()).await.unwrap();
        assert_eq!(code, 3);
    }
}
