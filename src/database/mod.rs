//! Database connection and management module
//!
//! Connection pooling and configuration for the Postgres-backed collection
//! store, plus the embedded schema.

use sqlx::Row;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::CollectionError;

mod collection_store;

pub use collection_store::PgCollectionStore;

const SCHEMA_SQL: &str = include_str!("../../migrations/001_dataset_collections.sql");

const SCHEMA_TABLES: &[&str] = &[
    "history",
    "library",
    "library_folder",
    "history_dataset_association",
    "library_dataset_dataset_association",
    "dataset_collection",
    "dataset_collection_element",
    "history_dataset_collection_association",
    "library_dataset_collection_association",
];

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections,
            ..Self::default()
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/collections".to_string()),
            max_connections: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Create a new database manager with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            "Connecting to database: {}",
            mask_database_url(&config.database_url)
        );

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!("Failed to connect to database: {}", e);
                e
            })?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Collection store sharing this connection pool
    pub fn collection_store(&self) -> PgCollectionStore {
        PgCollectionStore::new(self.pool.clone())
    }

    /// Test database connectivity
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    /// Apply the embedded schema and verify every table is present
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        info!("Applying dataset collection schema");
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM information_schema.tables
            WHERE table_schema = current_schema()
              AND table_name = ANY($1)
            "#,
        )
        .bind(SCHEMA_TABLES)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        if count < SCHEMA_TABLES.len() as i64 {
            warn!(
                "Expected {} collection tables, found {}",
                SCHEMA_TABLES.len(),
                count
            );
            return Err(sqlx::Error::Protocol(format!(
                "schema incomplete: {count} of {} tables",
                SCHEMA_TABLES.len()
            )));
        }

        info!("Database schema verification complete");
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Map a sqlx failure onto the collection error taxonomy.
///
/// Connectivity problems are transient (`StorageUnavailable`); anything else
/// is an internal fault.
pub(crate) fn storage_error(error: sqlx::Error) -> CollectionError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Tls(_) => {
            warn!("Database unavailable: {}", error);
            CollectionError::StorageUnavailable(error.to_string())
        }
        other => CollectionError::Internal(other.into()),
    }
}

/// Mask sensitive information in database URL for logging
fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else if url.len() > 20 {
        format!("{}***{}", &url[..10], &url[url.len() - 10..])
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_database_url_hides_password() {
        let masked = mask_database_url("postgresql://galaxy:hunter2@db:5432/collections");
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains("***"));
    }

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(storage_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!storage_error(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_schema_mentions_every_table() {
        for table in SCHEMA_TABLES {
            assert!(SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} ")));
        }
    }
}
