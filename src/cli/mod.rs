//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for MedBridge using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// MedBridge - Healthcare Integration Pipeline
#[derive(Parser, Debug)]
#[command(name = "medbridge")]
#[command(version, about, long_about = None)]
#[command(author = "MedBridge Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "medbridge.toml", env = "MEDBRIDGE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MEDBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the worker pool until interrupted
    Serve(commands::serve::ServeArgs),

    /// Submit a record for processing
    Submit(commands::submit::SubmitArgs),

    /// Show the status of a message
    Status(commands::status::StatusArgs),

    /// Show queue counters and per-client daily statistics
    Stats(commands::stats::StatsArgs),

    /// List dead-lettered messages
    DeadLetters(commands::dead_letters::DeadLettersArgs),

    /// Map and validate a record without queueing it
    Map(commands::map::MapArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
