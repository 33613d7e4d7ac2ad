//! # Core Configuration Module
//!
//! Provides configuration management for the catalog core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every dependency and setting the sync engine needs. `build()`
//! validates eagerly so misconfiguration fails at startup rather than on the
//! first sync pass.
//!
//! ## Dependencies
//!
//! - `ObjectStore` - Optional. Without it the core runs permanently offline.
//! - `Clock` - Optional, defaults to `SystemClock`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, SyncSettings};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/share/catalog.db")
//!     .object_store(Arc::new(MyS3Store::new()))
//!     .sync_settings(SyncSettings {
//!         sweep_interval: Duration::from_secs(60),
//!         ..SyncSettings::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, ObjectStore, SystemClock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default event bus capacity
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Tunables for reconciliation, sweeping and retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Timeout for the connectivity probe that starts every sync pass
    pub connectivity_timeout: Duration,

    /// Timeout for verifying a single record (retries included)
    pub verify_timeout: Duration,

    /// Timeout for an entire sync pass
    pub sync_timeout: Duration,

    /// Records verified concurrently during a sync pass
    pub max_concurrent_verifications: usize,

    /// How often the lifecycle sweeper runs
    pub sweep_interval: Duration,

    /// Run one reconciliation pass when the service starts
    pub sync_on_startup: bool,

    /// Attempts per remote call, first try included
    pub retry_max_attempts: u32,

    /// Delay before the first retry
    pub retry_base_delay: Duration,

    /// Upper bound for any single backoff delay
    pub retry_max_delay: Duration,

    /// Growth factor between consecutive delays
    pub retry_multiplier: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            connectivity_timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(600),
            max_concurrent_verifications: 4,
            sweep_interval: Duration::from_secs(300),
            sync_on_startup: true,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
        }
    }
}

impl SyncSettings {
    /// Parse settings from JSON, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// `Error::Serialization` for malformed JSON, `Error::Config` if the
    /// parsed values fail validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: SyncSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("connectivity_timeout", self.connectivity_timeout),
            ("verify_timeout", self.verify_timeout),
            ("sync_timeout", self.sync_timeout),
            ("sweep_interval", self.sweep_interval),
        ];
        for (field, value) in non_zero {
            if value.is_zero() {
                return Err(Error::Config(format!("{} must be greater than zero", field)));
            }
        }

        if self.max_concurrent_verifications == 0 {
            return Err(Error::Config(
                "max_concurrent_verifications must be at least 1".to_string(),
            ));
        }

        if self.retry_max_attempts == 0 {
            return Err(Error::Config(
                "retry_max_attempts must be at least 1".to_string(),
            ));
        }

        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry_multiplier must be >= 1.0, got {}",
                self.retry_multiplier
            )));
        }

        if self.retry_max_delay < self.retry_base_delay {
            return Err(Error::Config(
                "retry_max_delay must not be smaller than retry_base_delay".to_string(),
            ));
        }

        Ok(())
    }
}

/// Core configuration for the catalog sync engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// SQLite database file; `None` means an in-memory catalog
    pub database_path: Option<PathBuf>,

    /// Authoritative remote store (optional; absent means always offline)
    pub object_store: Option<Arc<dyn ObjectStore>>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Event bus capacity
    pub event_buffer_size: usize,

    /// Reconciliation and sweep tunables
    pub sync: SyncSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field(
                "object_store",
                &self.object_store.as_ref().map(|store| store.describe()),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .field("sync", &self.sync)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }
}

/// Builder for [`CoreConfig`]
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    in_memory: bool,
    object_store: Option<Arc<dyn ObjectStore>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    sync: Option<SyncSettings>,
}

impl CoreConfigBuilder {
    pub fn database_path(mut self, path: impl AsRef<Path>) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Keep the catalog in memory (tests, ephemeral sessions)
    pub fn in_memory(mut self) -> Self {
        self.in_memory = true;
        self
    }

    pub fn object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn sync_settings(mut self, settings: SyncSettings) -> Self {
        self.sync = Some(settings);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    ///
    /// - `Error::CapabilityMissing` if neither a database path nor
    ///   `in_memory()` was given
    /// - `Error::Config` for invalid sync settings or a zero event buffer
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = match (self.database_path, self.in_memory) {
            (Some(path), false) => Some(path),
            (None, true) => None,
            (Some(_), true) => {
                return Err(Error::Config(
                    "database_path and in_memory are mutually exclusive".to_string(),
                ))
            }
            (None, false) => {
                return Err(Error::CapabilityMissing {
                    capability: "database_path".to_string(),
                    message: "Provide a catalog database path or call in_memory()".to_string(),
                })
            }
        };

        let sync = self.sync.unwrap_or_default();
        sync.validate()?;

        let event_buffer_size = self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE);
        if event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }

        Ok(CoreConfig {
            database_path,
            object_store: self.object_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size,
            sync,
        })
    }
}
