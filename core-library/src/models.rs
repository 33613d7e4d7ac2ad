//! Domain models for the local catalog
//!
//! A `CatalogRecord` describes one file the user shared through the remote
//! object store. Records are created upstream (by the upload flow); the sync
//! core only ever reads them and moves their status forward.
//!
//! ## Status Graph
//!
//! ```text
//! Uploading ──→ Active ──→ Expired
//!     │            │
//!     │            └─────→ Deleted
//!     └──────────────────→ Expired
//!
//! any ──→ Error        Error ──→ Expired
//! ```
//!
//! Nothing ever returns to `Uploading`, and `Expired`/`Deleted` never revert
//! to `Active`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::LibraryError;

// =============================================================================
// Status
// =============================================================================

/// Lifecycle status of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Upload started but not yet confirmed by the remote store
    Uploading,
    /// Object confirmed to exist remotely
    Active,
    /// Expiration deadline passed
    Expired,
    /// Object disappeared from the remote store
    Deleted,
    /// Upload or verification failed permanently
    Error,
}

impl RecordStatus {
    /// Expired and Deleted are terminal-leaning: the sweeper skips them and
    /// the reconciler never resurrects them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Expired | RecordStatus::Deleted)
    }

    /// Whether moving from `self` to `next` respects the forward-only graph.
    ///
    /// A move to the same status is not a transition and returns `false`.
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        use RecordStatus::*;

        match (*self, next) {
            (from, to) if from == to => false,
            (_, Uploading) => false,
            (Uploading, Active) | (Uploading, Expired) | (Uploading, Error) => true,
            (Active, Expired) | (Active, Deleted) | (Active, Error) => true,
            (Error, Expired) => true,
            (Expired, Error) | (Deleted, Error) => true,
            _ => false,
        }
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Uploading => "uploading",
            RecordStatus::Active => "active",
            RecordStatus::Expired => "expired",
            RecordStatus::Deleted => "deleted",
            RecordStatus::Error => "error",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uploading" => Ok(RecordStatus::Uploading),
            "active" => Ok(RecordStatus::Active),
            "expired" => Ok(RecordStatus::Expired),
            "deleted" => Ok(RecordStatus::Deleted),
            "error" => Ok(RecordStatus::Error),
            other => Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("unknown record status '{}'", other),
            }),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Record
// =============================================================================

/// One entry in the local catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: String,
    pub display_name: String,
    pub local_path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Key of the object in the remote store
    pub remote_key: String,
    pub status: RecordStatus,
}

impl CatalogRecord {
    /// Create a new record in the `Uploading` state with a random id
    pub fn new(
        display_name: impl Into<String>,
        local_path: impl Into<String>,
        size_bytes: u64,
        remote_key: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.into(),
            local_path: local_path.into(),
            size_bytes,
            created_at,
            expires_at,
            remote_key: remote_key.into(),
            status: RecordStatus::Uploading,
        }
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    /// Validate record data
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Record id cannot be empty".to_string());
        }

        if self.display_name.trim().is_empty() {
            return Err("Display name cannot be empty".to_string());
        }

        if self.remote_key.trim().is_empty() {
            return Err("Remote key cannot be empty".to_string());
        }

        if self.expires_at < self.created_at {
            return Err("Expiration cannot precede creation".to_string());
        }

        Ok(())
    }

    /// A deadline equal to `now` counts as passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime, clamped at zero once the deadline has passed
    pub fn time_until_expiration(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}
