//! Database Connection Pool Module
//!
//! This module provides PostgreSQL connection pooling using deadpool-postgres.
//! It owns only the pool and its configuration; SQL construction lives in the
//! schema and query modules, which receive a checked-out client per request.
//!
//! Schema discovery runs against the same pool as data queries, so every
//! request observes one consistent view of the catalog.

use crate::error::{ApiError, ApiResult};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "clinica".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CLINICA_DB_HOST`: PostgreSQL host (default: localhost)
    /// - `CLINICA_DB_PORT`: PostgreSQL port (default: 5432)
    /// - `CLINICA_DB_NAME`: Database name (default: clinica)
    /// - `CLINICA_DB_USER`: Database user (default: postgres)
    /// - `CLINICA_DB_PASSWORD`: Database password (default: empty)
    /// - `CLINICA_DB_POOL_SIZE`: Maximum pool size (default: 16)
    /// - `CLINICA_DB_TIMEOUT`: Connection timeout in seconds (default: 30)
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("CLINICA_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("CLINICA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("CLINICA_DB_NAME").unwrap_or_else(|_| "clinica".to_string()),
            user: std::env::var("CLINICA_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("CLINICA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("CLINICA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("CLINICA_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// DATABASE HANDLE
// ============================================================================

/// Shared handle over the connection pool.
///
/// Cheap to clone; every route handler checks out one client and keeps it
/// for the whole request so discovery and the data query see the same
/// connection.
#[derive(Clone)]
pub struct Db {
    pool: Pool,
}

impl Db {
    /// Create a new database handle from a connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a handle from configuration (creates the pool).
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Check out a pooled client.
    pub async fn client(&self) -> ApiResult<Object> {
        let client = self.pool.get().await?;
        Ok(client)
    }

    /// Pool status for the health endpoint.
    pub fn status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_config_default() {
        let config = DbConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "clinica");
        assert_eq!(config.max_size, 16);
    }

    #[test]
    fn test_db_config_creates_pool() -> ApiResult<()> {
        // Pool creation is lazy; no server needs to be running.
        let config = DbConfig::default();
        let pool = config.create_pool()?;
        assert_eq!(pool.status().size, 0);
        Ok(())
    }
}
