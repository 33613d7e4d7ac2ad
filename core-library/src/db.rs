//! SQLite pool for the local catalog.
//!
//! The reconciler and the sweeper write from different tasks, so file-backed
//! catalogs open in WAL mode with a busy timeout. Migrations are embedded and
//! applied every time a pool is opened.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("catalog.db")).await?;
//! ```

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the catalog lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    /// Private to a single connection; gone when the pool closes
    Memory,
}

/// Pool settings for the catalog database
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub location: Location,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Connections idle longer than this are closed
    pub idle_timeout: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            max_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.location {
            Location::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            Location::Memory => SqliteConnectOptions::new().in_memory(true),
        };
        options.busy_timeout(BUSY_TIMEOUT)
    }

    /// Every in-memory connection sees its own empty database.
    fn effective_max_connections(&self) -> u32 {
        match self.location {
            Location::Memory => 1,
            Location::File(_) => self.max_connections.max(1),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Open the catalog pool and bring its schema up to date
///
/// # Errors
///
/// `LibraryError::Database` if the file cannot be opened or the first query
/// fails, `LibraryError::Migration` if a migration is rejected.
pub async fn create_pool(config: DatabaseConfig) -> Result<SqlitePool> {
    let max_connections = config.effective_max_connections();
    info!(location = ?config.location, max_connections, "Opening catalog database");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(config.connect_options())
        .await
        .map_err(|e| {
            warn!(error = %e, "Could not open catalog database");
            LibraryError::Database(e)
        })?;

    migrate(&pool).await?;
    ping(&pool).await?;

    Ok(pool)
}

/// Fresh in-memory catalog with the schema applied
pub async fn create_test_pool() -> Result<SqlitePool> {
    create_pool(DatabaseConfig::in_memory()).await
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| LibraryError::Migration(e.to_string()))?;
    debug!("Catalog schema up to date");
    Ok(())
}

async fn ping(pool: &SqlitePool) -> Result<()> {
    let _: (i64,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_pool_is_pinned_to_one_connection() {
        let pool = create_pool(DatabaseConfig::in_memory().max_connections(8))
            .await
            .unwrap();
        assert_eq!(pool.options().get_max_connections(), 1);
    }

    #[tokio::test]
    async fn test_schema_is_applied() {
        let pool = create_test_pool().await.unwrap();

        for table in ["catalog_records", "app_config"] {
            let (count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_busy_timeout_is_set() {
        let pool = create_test_pool().await.unwrap();
        let (timeout_ms,): (i64,) = sqlx::query_as("PRAGMA busy_timeout")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_file_catalog_survives_reopen() {
        let path = std::env::temp_dir().join(format!("catalog-{}.db", uuid::Uuid::new_v4()));

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        sqlx::query("INSERT INTO app_config (key, value, updated_at) VALUES ('k', 'v', 0)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let reopened = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let (value,): (String,) = sqlx::query_as("SELECT value FROM app_config WHERE key = 'k'")
            .fetch_one(&reopened)
            .await
            .unwrap();
        assert_eq!(value, "v");
        reopened.close().await;

        for suffix in ["", "-wal", "-shm"] {
            std::fs::remove_file(format!("{}{}", path.display(), suffix)).ok();
        }
    }

    #[test]
    fn test_config_builder() {
        let config = DatabaseConfig::new("/tmp/catalog.db")
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(60));

        assert_eq!(config.location, Location::File(PathBuf::from("/tmp/catalog.db")));
        assert_eq!(config.effective_max_connections(), 10);
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(DatabaseConfig::default().location, Location::Memory);
    }
}
