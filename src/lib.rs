// MedBridge - Healthcare Integration Pipeline
// Copyright (c) 2025 MedBridge Contributors
// Licensed under the MIT License

//! # MedBridge - Healthcare Integration Pipeline
//!
//! MedBridge ingests healthcare records in proprietary shapes, maps them to
//! standardized clinical resources, validates the result, and reports status
//! back to the submitting system without losing or duplicating work.
//!
//! ## Overview
//!
//! This library provides:
//! - **Queueing** submissions idempotently by message ID
//! - **Leasing** jobs to a pool of workers, at most one worker per job
//! - **Mapping** records with declarative rules and named transforms
//! - **Validating** mapped resources with per-kind rule sets
//! - **Retrying** failures with exponential backoff and a dead-letter state
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Pipeline logic (mapping, validation, queue, workers, status)
//! - [`adapters`] - Job, mapping and stats stores (in-memory, PostgreSQL)
//! - [`sinks`] - Alert and audit side channels
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//! use medbridge::core::services::PipelineServices;
//! use medbridge::core::worker::WorkerPool;
//! use medbridge::domain::SubmitRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("medbridge.toml")?;
//!     let services = PipelineServices::from_config(&config).await?;
//!     let pool = WorkerPool::new(services, &config.queue);
//!
//!     let request: SubmitRequest = serde_json::from_str(r#"{
//!         "clientId": "clinic-a",
//!         "mappingId": "body-temperature",
//!         "sourceData": {"patientId": "123", "temperature": "37.8"},
//!         "encryptionKeyRef": "clinic-a"
//!     }"#)?;
//!     let receipt = pool.broker().submit(request, chrono::Utc::now()).await?;
//!     println!("Queued {}", receipt.message_id);
//!
//!     pool.drain().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Mapping
//!
//! A mapping is an ordered list of rules. Each rule reads a dot-separated
//! source path, optionally runs a named transform, coerces the value, and
//! writes it at a target path. Problems are collected, not raised:
//!
//! ```rust
//! use medbridge::core::mapping::{presets, MappingEngine};
//! use serde_json::json;
//!
//! let source = json!({"id": "p1", "gender": "F"});
//! let outcome = MappingEngine::default().map(
//!     source.as_object().unwrap(),
//!     &presets::basic_patient(),
//! );
//! assert_eq!(outcome.target["gender"], "female");
//! assert_eq!(outcome.errors, vec!["Required field missing: familyName"]);
//! ```
//!
//! ## Error Handling
//!
//! MedBridge uses [`domain::MedbridgeError`] for all errors. Pipeline
//! failures never reach the submitter as errors; they become retries, a
//! dead-lettered job, or a `failed` status with the collected messages.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
pub mod sinks;
