//! CLI command implementations
//!
//! Commands return process exit codes: 0 success, 2 configuration error,
//! 3 not found, 4 connection error, 5 fatal error.

pub mod dead_letters;
pub mod init;
pub mod map;
pub mod serve;
pub mod stats;
pub mod status;
pub mod submit;
pub mod validate;

use crate::config::{load_config, MedbridgeConfig};
use crate::core::services::PipelineServices;
use crate::domain::MedbridgeError;

/// Load the configuration, printing the failure and its exit code on error
pub(crate) fn load_or_report(config_path: &str) -> Result<MedbridgeConfig, i32> {
    load_config(config_path).map_err(|e| {
        println!("❌ Failed to load configuration file");
        println!("   Error: {e}");
        2 // Configuration error exit code
    })
}

/// Build the pipeline services, printing the failure and its exit code on error
pub(crate) async fn connect_or_report(config: &MedbridgeConfig) -> Result<PipelineServices, i32> {
    PipelineServices::from_config(config).await.map_err(|e| match e {
        MedbridgeError::Configuration(_) => {
            println!("❌ Invalid pipeline configuration");
            println!("   Error: {e}");
            2 // Configuration error exit code
        }
        _ => {
            println!("❌ Failed to connect to the job store");
            println!("   Error: {e}");
            4 // Connection error exit code
        }
    })
}
