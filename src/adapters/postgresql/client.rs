//! PostgreSQL client implementation
//!
//! Connection pooling, TLS setup, schema migration, and statement timeouts.

use crate::config::schema::PostgreSQLConfig;
use crate::domain::{MedbridgeError, Result, StoreError};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

/// Bundled schema, applied when `run_migrations` is set
const SCHEMA_SQL: &str = include_str!("../../../migrations/001_pipeline_schema.sql");

/// PostgreSQL client for MedBridge
///
/// Every statement runs on a pooled connection with the configured
/// statement timeout applied first.
pub struct PostgreSQLClient {
    pool: Pool,
    config: PostgreSQLConfig,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// The pool is created lazily; no connection is opened until the first
    /// query or [`PostgreSQLClient::test_connection`].
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string or TLS setup is invalid.
    pub async fn new(config: PostgreSQLConfig) -> Result<Self> {
        let conn_str: &str = config.connection_string.expose_secret().as_ref();
        let mut pg_config: tokio_postgres::Config = conn_str.parse().map_err(|e| {
            MedbridgeError::Configuration(format!("Invalid PostgreSQL connection string: {}", e))
        })?;

        pg_config.ssl_mode(match config.ssl_mode.as_str() {
            "disable" => SslMode::Disable,
            "require" => SslMode::Require,
            _ => SslMode::Prefer,
        });

        let connector = native_tls::TlsConnector::builder().build().map_err(|e| {
            MedbridgeError::Configuration(format!("Failed to initialise TLS: {}", e))
        })?;
        let tls = MakeTlsConnector::new(connector);

        let manager = Manager::from_config(
            pg_config,
            tls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .recycle_timeout(Some(timeout))
            .build()
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool, config })
    }

    /// Test the connection to PostgreSQL
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| StoreError::ConnectionFailed(format!("Connection test failed: {}", e)))?;

        tracing::info!(
            target = %self.connection_string_safe(),
            "PostgreSQL connection test successful"
        );
        Ok(())
    }

    /// Create tables and indexes if they don't exist
    pub async fn run_migrations(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client.batch_execute(SCHEMA_SQL).await.map_err(|e| {
            StoreError::QueryFailed(format!("Failed to execute migration: {}", e))
        })?;

        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StoreError::ConnectionFailed(format!("Failed to get connection from pool: {}", e))
                .into()
        })
    }

    async fn prepared_connection(&self) -> Result<deadpool_postgres::Object> {
        let client = self.get_connection().await?;
        let timeout_query = format!(
            "SET statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        );
        client.execute(&timeout_query, &[]).await.map_err(|e| {
            StoreError::QueryFailed(format!("Failed to set statement timeout: {}", e))
        })?;
        Ok(client)
    }

    /// Execute a query and return rows
    pub async fn query(&self, query: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let client = self.prepared_connection().await?;
        client
            .query(query, params)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)).into())
    }

    /// Execute a query expected to return at most one row
    pub async fn query_opt(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Option<Row>> {
        let client = self.prepared_connection().await?;
        client
            .query_opt(query, params)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Query failed: {}", e)).into())
    }

    /// Execute a statement and return the number of affected rows
    pub async fn execute(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let client = self.prepared_connection().await?;
        client.execute(statement, params).await.map_err(|e| {
            StoreError::QueryFailed(format!("Statement execution failed: {}", e)).into()
        })
    }

    /// Connection target with credentials removed, for logs
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_ref())
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

/// Strip credentials from a PostgreSQL connection string
pub fn redact_connection_string(conn_str: &str) -> String {
    conn_str
        .rsplit_once('@')
        .map(|(_, host)| format!("postgresql://***@{}", host))
        .unwrap_or_else(|| "postgresql://***".to_string())
}
