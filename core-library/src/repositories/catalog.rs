//! Catalog repository trait and SQLite implementation

use crate::error::{LibraryError, Result};
use crate::models::{CatalogRecord, RecordStatus};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

/// Config key holding the RFC3339 timestamp of the last successful sync
pub const LAST_SYNC_KEY: &str = "last_sync_time";

/// Local catalog interface consumed by the reconciler and the sweeper
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch a record by id
    ///
    /// # Errors
    /// Returns `LibraryError::NotFound` if no record has this id
    async fn get_record(&self, id: &str) -> Result<CatalogRecord>;

    /// List every record in the catalog, oldest first
    async fn list_records(&self) -> Result<Vec<CatalogRecord>>;

    /// Insert a new record
    ///
    /// # Errors
    /// Returns error if validation fails or the id already exists
    async fn insert_record(&self, record: &CatalogRecord) -> Result<()>;

    /// Overwrite the status of a record
    ///
    /// No transition check happens here; concurrent writers resolve by
    /// last-write-wins.
    ///
    /// # Errors
    /// Returns `LibraryError::NotFound` if no record has this id
    async fn update_status(&self, id: &str, status: RecordStatus) -> Result<()>;

    /// Overwrite the expiration deadline of a record
    ///
    /// # Errors
    /// Returns `LibraryError::NotFound` if no record has this id
    async fn update_expiration(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Upsert a string config value
    async fn save_config_value(&self, key: &str, value: &str) -> Result<()>;

    /// Read a string config value
    ///
    /// # Errors
    /// Returns `LibraryError::NotFound` if the key was never saved
    async fn get_config_value(&self, key: &str) -> Result<String>;
}

/// SQLite implementation of CatalogStore
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Database row representation of a catalog record
#[derive(Debug, FromRow)]
struct CatalogRecordRow {
    id: String,
    display_name: String,
    local_path: String,
    size_bytes: i64,
    created_at: i64,
    expires_at: i64,
    remote_key: String,
    status: String,
}

impl TryFrom<CatalogRecordRow> for CatalogRecord {
    type Error = LibraryError;

    fn try_from(row: CatalogRecordRow) -> Result<Self> {
        Ok(CatalogRecord {
            created_at: from_micros(row.created_at, "created_at")?,
            expires_at: from_micros(row.expires_at, "expires_at")?,
            status: row.status.parse()?,
            size_bytes: u64::try_from(row.size_bytes).map_err(|_| LibraryError::InvalidInput {
                field: "size_bytes".to_string(),
                message: format!("negative size {}", row.size_bytes),
            })?,
            id: row.id,
            display_name: row.display_name,
            local_path: row.local_path,
            remote_key: row.remote_key,
        })
    }
}

fn from_micros(micros: i64, field: &str) -> Result<DateTime<Utc>> {
    Utc.timestamp_micros(micros)
        .single()
        .ok_or_else(|| LibraryError::InvalidInput {
            field: field.to_string(),
            message: format!("timestamp {} out of range", micros),
        })
}

fn not_found(entity_type: &str, id: &str) -> LibraryError {
    LibraryError::NotFound {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn get_record(&self, id: &str) -> Result<CatalogRecord> {
        let row = sqlx::query_as::<_, CatalogRecordRow>(
            r#"
            SELECT id, display_name, local_path, size_bytes, created_at,
                   expires_at, remote_key, status
            FROM catalog_records
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| not_found("CatalogRecord", id))?
            .try_into()
    }

    async fn list_records(&self) -> Result<Vec<CatalogRecord>> {
        let rows = sqlx::query_as::<_, CatalogRecordRow>(
            r#"
            SELECT id, display_name, local_path, size_bytes, created_at,
                   expires_at, remote_key, status
            FROM catalog_records
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CatalogRecord::try_from).collect()
    }

    async fn insert_record(&self, record: &CatalogRecord) -> Result<()> {
        record
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "CatalogRecord".to_string(),
                message,
            })?;

        let size = i64::try_from(record.size_bytes).map_err(|_| LibraryError::InvalidInput {
            field: "size_bytes".to_string(),
            message: format!("size {} does not fit the catalog", record.size_bytes),
        })?;

        sqlx::query(
            r#"
            INSERT INTO catalog_records (
                id, display_name, local_path, size_bytes, created_at,
                expires_at, remote_key, status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.display_name)
        .bind(&record.local_path)
        .bind(size)
        .bind(record.created_at.timestamp_micros())
        .bind(record.expires_at.timestamp_micros())
        .bind(&record.remote_key)
        .bind(record.status.as_str())
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;

        debug!(record_id = %record.id, status = %record.status, "Inserted catalog record");
        Ok(())
    }

    async fn update_status(&self, id: &str, status: RecordStatus) -> Result<()> {
        let result = sqlx::query(
            "UPDATE catalog_records SET status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().timestamp_micros())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("CatalogRecord", id));
        }

        debug!(record_id = %id, status = %status, "Updated record status");
        Ok(())
    }

    async fn update_expiration(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE catalog_records SET expires_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(expires_at.timestamp_micros())
        .bind(Utc::now().timestamp_micros())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found("CatalogRecord", id));
        }

        Ok(())
    }

    async fn save_config_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_config (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().timestamp_micros())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_config_value(&self, key: &str) -> Result<String> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM app_config WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        value
            .map(|(value,)| value)
            .ok_or_else(|| not_found("ConfigValue", key))
    }
}
