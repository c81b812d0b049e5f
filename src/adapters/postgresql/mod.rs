//! PostgreSQL store backend
//!
//! Implements the job, mapping and stats stores on a single database. Used
//! when `store_backend = "postgresql"`; required for production.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
