//! Core service façade and bootstrap helpers.
//!
//! Wires a [`CoreConfig`] into a running catalog sync core: opens the SQLite
//! catalog, builds the shared mode controller, reconciler and sweeper, and
//! owns the two background drivers (periodic sweep, startup sync).
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("catalog.db")
//!     .object_store(store)
//!     .build()?;
//!
//! let core = CoreService::bootstrap(config).await?;
//! core.start().await?;
//! let outcome = core.sync_with_remote().await?;
//! core.shutdown().await;
//! ```

pub mod error;

pub use core_sync::{
    classify, retry_with_backoff, ClassifiedError, ErrorCode, RetryConfig, SyncOutcome,
    VerificationResult,
};
pub use error::{CoreError, Result};

use bridge_traits::ObjectStore;
use chrono::{DateTime, Utc};
use core_library::{create_pool, CatalogRecord, CatalogStore, DatabaseConfig, SqliteCatalogStore};
use core_runtime::config::{CoreConfig, SyncSettings};
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{LifecycleSweeper, ModeController, Reconciler, ReconcilerConfig, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    catalog: Arc<dyn CatalogStore>,
    object_store: Option<Arc<dyn ObjectStore>>,
    mode: Arc<ModeController>,
    reconciler: Arc<Reconciler>,
    sweeper: Arc<LifecycleSweeper>,
    event_bus: EventBus,
    settings: SyncSettings,
    retry: RetryConfig,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoreService {
    /// Open the catalog described by `config` and assemble the core.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Library` if the database cannot be opened or
    /// migrated.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        let db_config = match &config.database_path {
            Some(path) => DatabaseConfig::new(path),
            None => DatabaseConfig::in_memory(),
        };

        let pool = create_pool(db_config).await?;
        let catalog: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(pool));

        Ok(Self::with_store(config, catalog))
    }

    /// Assemble the core around an existing catalog store.
    pub fn with_store(config: CoreConfig, catalog: Arc<dyn CatalogStore>) -> Self {
        let event_bus = EventBus::new(config.event_buffer_size);
        let mode = Arc::new(ModeController::new().with_event_bus(event_bus.clone()));

        if config.object_store.is_none() {
            warn!("No object store configured; the core will stay offline");
        }

        let reconciler = Reconciler::new(
            catalog.clone(),
            config.object_store.clone(),
            mode.clone(),
            config.clock.clone(),
            ReconcilerConfig::from(&config.sync),
        )
        .with_event_bus(event_bus.clone());

        let sweeper = LifecycleSweeper::new(catalog.clone(), config.clock.clone())
            .with_event_bus(event_bus.clone());

        info!(?config, "Core service assembled");

        Self {
            catalog,
            object_store: config.object_store,
            mode,
            reconciler: Arc::new(reconciler),
            sweeper: Arc::new(sweeper),
            event_bus,
            retry: RetryConfig::from(&config.sync),
            settings: config.sync,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the periodic sweeper and, if configured, a one-shot startup sync.
    ///
    /// # Errors
    ///
    /// `CoreError::AlreadyStarted` if the drivers are running,
    /// `CoreError::ShutDown` after [`shutdown`](Self::shutdown).
    pub async fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::ShutDown);
        }

        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Err(CoreError::AlreadyStarted);
        }

        tasks.push(
            self.sweeper
                .clone()
                .spawn(self.settings.sweep_interval, self.cancel.child_token()),
        );

        if self.settings.sync_on_startup {
            let reconciler = self.reconciler.clone();
            let cancel = self.cancel.child_token();
            let limit = self.settings.sync_timeout;

            tasks.push(tokio::spawn(async move {
                match run_sync(&reconciler, &cancel, limit).await {
                    Ok(outcome) => info!(
                        total = outcome.total,
                        updated = outcome.updated.len(),
                        "Startup sync finished"
                    ),
                    Err(SyncError::Offline { cause, .. }) => {
                        warn!(code = %cause.code(), "Startup sync skipped; remote unreachable")
                    }
                    Err(SyncError::Cancelled) => info!("Startup sync cancelled"),
                    Err(e) => error!(error = %e, "Startup sync failed"),
                }
            }));
        }

        info!(
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            sync_on_startup = self.settings.sync_on_startup,
            "Background tasks started"
        );
        Ok(())
    }

    /// Cancel the background drivers and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        info!("Core service stopped");
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Reconcile the whole catalog, bounded by `sync_timeout`.
    pub async fn sync_with_remote(&self) -> Result<SyncOutcome> {
        let cancel = self.cancel.child_token();
        Ok(run_sync(&self.reconciler, &cancel, self.settings.sync_timeout).await?)
    }

    pub async fn verify_one(&self, id: &str) -> Result<VerificationResult> {
        Ok(self.reconciler.verify_one(&self.cancel, id).await?)
    }

    pub fn is_offline_mode(&self) -> bool {
        self.reconciler.is_offline_mode()
    }

    pub fn set_offline_mode(&self, offline: bool) {
        self.reconciler.set_offline_mode(offline);
    }

    pub async fn get_last_sync_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.reconciler.get_last_sync_time().await?)
    }

    // =========================================================================
    // Lifecycle sweep
    // =========================================================================

    pub async fn check_expirations(&self) -> Result<Vec<CatalogRecord>> {
        Ok(self.sweeper.check_expirations().await?)
    }

    pub async fn cleanup_expired_files(&self) -> Result<usize> {
        Ok(self.sweeper.cleanup_expired_files().await?)
    }

    pub async fn is_file_expired(&self, id: &str) -> Result<bool> {
        Ok(self.sweeper.is_file_expired(id).await?)
    }

    pub async fn time_until_expiration(&self, id: &str) -> Result<Duration> {
        Ok(self.sweeper.time_until_expiration(id).await?)
    }

    pub async fn set_expiration(&self, id: &str, ttl: Duration) -> Result<()> {
        Ok(self.sweeper.set_expiration(id, ttl).await?)
    }

    // =========================================================================
    // Remote access
    // =========================================================================

    /// Ask the remote store whether `key` exists.
    ///
    /// Fails fast with `ServiceUnavailable` while offline; otherwise retries
    /// recoverable failures. A "no such key" error reads as `false`.
    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        self.mode.ensure_online()?;

        let store = self.object_store.as_ref().ok_or_else(|| {
            ClassifiedError::new(ErrorCode::ServiceUnavailable, "no remote store configured")
        })?;

        match retry_with_backoff(&self.cancel, &self.retry, || store.check_exists(key)).await {
            Ok(found) => Ok(found),
            Err(e) if e.code() == ErrorCode::ObjectNotFound => Ok(false),
            Err(e) => Err(e.with_context("key", key).into()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Local catalog, for upstream record creation
    pub fn catalog(&self) -> Arc<dyn CatalogStore> {
        self.catalog.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<bool> {
        self.mode.subscribe()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}

async fn run_sync(
    reconciler: &Reconciler,
    cancel: &CancellationToken,
    limit: Duration,
) -> core_sync::Result<SyncOutcome> {
    match tokio::time::timeout(limit, reconciler.sync_with_remote(cancel)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_secs = limit.as_secs(), "Sync pass timed out");
            Err(SyncError::Timeout(limit.as_secs()))
        }
    }
}
