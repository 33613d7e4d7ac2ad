//! # Reconciler
//!
//! Compares the local catalog against the remote object store and corrects
//! drift.
//!
//! ## Sync Pass
//!
//! 1. Probe connectivity under `connectivity_timeout`. Failure (or no remote
//!    store at all) flips the core offline and ends the pass with
//!    `SyncError::Offline`.
//! 2. List local records and verify every one not `Deleted` or `Error`,
//!    `max_concurrent_verifications` at a time, each bounded by
//!    `verify_timeout`.
//! 3. Write corrected statuses back. Per-record failures land in the outcome,
//!    never abort the pass.
//! 4. Persist the last-sync timestamp.
//!
//! ## Verification Precedence
//!
//! When the object exists, expiration wins over upload completion: an
//! `Uploading` record past its deadline becomes `Expired`, not `Active`. When
//! the object is missing, only `Active` records become `Deleted`.

use crate::classified::{ClassifiedError, ErrorCode};
use crate::classifier::classify;
use crate::error::{Result, SyncError};
use crate::mode::ModeController;
use crate::retry::{retry_with_backoff, RetryConfig};
use bridge_traits::{Clock, ObjectStore};
use chrono::{DateTime, SecondsFormat, Utc};
use core_library::repositories::LAST_SYNC_KEY;
use core_library::{CatalogRecord, CatalogStore, RecordStatus};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Bound on the connectivity probe
    pub connectivity_timeout: Duration,
    /// Bound on one record's verification, retries included
    pub verify_timeout: Duration,
    /// Records verified at the same time
    pub max_concurrent_verifications: usize,
    /// Backoff for remote existence checks
    pub retry: RetryConfig,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            connectivity_timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(30),
            max_concurrent_verifications: 4,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&SyncSettings> for ReconcilerConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            connectivity_timeout: settings.connectivity_timeout,
            verify_timeout: settings.verify_timeout,
            max_concurrent_verifications: settings.max_concurrent_verifications,
            retry: RetryConfig::from(settings),
        }
    }
}

/// Summary of one sync pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    /// Records eligible for verification
    pub total: u64,
    /// Verified and present remotely
    pub verified: u64,
    /// Verified and absent remotely
    pub missing: u64,
    /// Records that failed verification or whose corrected status could not
    /// be written back. A persistence failure still counts the record under
    /// `verified` or `missing`.
    pub errored: u64,
    /// Records whose status was written back
    pub updated: Vec<String>,
    /// One entry per errored record, plus one if the last sync time could not
    /// be saved
    pub errors: Vec<ClassifiedError>,
    pub elapsed: Duration,
    /// Offline flag when the pass finished
    pub offline: bool,
}

impl SyncOutcome {
    fn offline(elapsed: Duration) -> Self {
        Self {
            total: 0,
            verified: 0,
            missing: 0,
            errored: 0,
            updated: Vec::new(),
            errors: Vec::new(),
            elapsed,
            offline: true,
        }
    }
}

/// Verification of a single record
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub id: String,
    pub existed: bool,
    pub previous_status: RecordStatus,
    pub new_status: RecordStatus,
    pub error: Option<ClassifiedError>,
}

impl VerificationResult {
    pub fn changed(&self) -> bool {
        self.previous_status != self.new_status
    }

    fn unchanged(record: &CatalogRecord, existed: bool) -> Self {
        Self {
            id: record.id.clone(),
            existed,
            previous_status: record.status,
            new_status: record.status,
            error: None,
        }
    }

    fn failed(record: &CatalogRecord, error: ClassifiedError) -> Self {
        Self {
            error: Some(
                error
                    .with_context("record_id", &record.id)
                    .with_context("remote_key", &record.remote_key),
            ),
            ..Self::unchanged(record, false)
        }
    }
}

/// Outcome of verifying and persisting one record during a pass
struct RecordReport {
    result: VerificationResult,
    persist_error: Option<ClassifiedError>,
}

pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    object_store: Option<Arc<dyn ObjectStore>>,
    mode: Arc<ModeController>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    event_bus: Option<EventBus>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        object_store: Option<Arc<dyn ObjectStore>>,
        mode: Arc<ModeController>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            object_store,
            mode,
            clock,
            config,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn is_offline_mode(&self) -> bool {
        self.mode.is_offline()
    }

    pub fn set_offline_mode(&self, offline: bool) {
        self.mode.set_offline(offline);
    }

    /// Time of the last completed sync pass
    ///
    /// # Errors
    /// `SyncError::NotFound` if no pass has ever completed
    pub async fn get_last_sync_time(&self) -> Result<DateTime<Utc>> {
        let raw = match self.store.get_config_value(LAST_SYNC_KEY).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                return Err(SyncError::NotFound {
                    entity_type: "SyncState".to_string(),
                    id: LAST_SYNC_KEY.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|e| SyncError::InvalidInput {
                field: LAST_SYNC_KEY.to_string(),
                message: format!("'{}' is not an RFC3339 timestamp: {}", raw, e),
            })
    }

    /// Reconcile the whole catalog.
    ///
    /// Only a failed connectivity probe, a failed catalog listing or
    /// cancellation fail the call. Every per-record problem is reported
    /// inside the returned outcome.
    #[instrument(skip(self, cancel))]
    pub async fn sync_with_remote(&self, cancel: &CancellationToken) -> Result<SyncOutcome> {
        let started = Instant::now();

        if let Err(cause) = self.probe(cancel).await {
            if cause.code() == ErrorCode::Canceled {
                return Err(SyncError::Cancelled);
            }

            warn!(code = %cause.code(), error = %cause, "Connectivity probe failed");
            self.mode.set_offline(true);
            self.emit(SyncEvent::WentOffline {
                reason: cause.user_message().to_string(),
            });
            return Err(SyncError::Offline {
                outcome: Box::new(SyncOutcome::offline(started.elapsed())),
                cause,
            });
        }
        self.mode.set_offline(false);

        let eligible: Vec<CatalogRecord> = self
            .store
            .list_records()
            .await?
            .into_iter()
            .filter(|record| {
                !matches!(record.status, RecordStatus::Deleted | RecordStatus::Error)
            })
            .collect();

        let total = eligible.len() as u64;
        info!(total, "Reconciliation started");
        self.emit(SyncEvent::Started { total });

        let reports: Vec<RecordReport> = stream::iter(eligible)
            .map(|record| self.reconcile_record(cancel, record))
            .buffer_unordered(self.config.max_concurrent_verifications.max(1))
            .collect()
            .await;

        if cancel.is_cancelled() {
            info!("Reconciliation cancelled");
            return Err(SyncError::Cancelled);
        }

        let mut outcome = SyncOutcome {
            total,
            verified: 0,
            missing: 0,
            errored: 0,
            updated: Vec::new(),
            errors: Vec::new(),
            elapsed: Duration::ZERO,
            offline: false,
        };

        for report in reports {
            let RecordReport {
                result,
                persist_error,
            } = report;

            match result.error {
                Some(error) => {
                    outcome.errored += 1;
                    outcome.errors.push(error);
                    continue;
                }
                None if result.existed => outcome.verified += 1,
                None => outcome.missing += 1,
            }

            match persist_error {
                Some(error) => {
                    outcome.errored += 1;
                    outcome.errors.push(error);
                }
                None if result.changed() => outcome.updated.push(result.id),
                None => {}
            }
        }

        let now = self.clock.now();
        if let Err(e) = self
            .store
            .save_config_value(LAST_SYNC_KEY, &now.to_rfc3339_opts(SecondsFormat::Micros, true))
            .await
        {
            warn!(error = %e, "Failed to persist last sync time");
            outcome
                .errors
                .push(classify(e).with_context("key", LAST_SYNC_KEY));
        }

        outcome.elapsed = started.elapsed();
        outcome.offline = self.mode.is_offline();

        info!(
            total = outcome.total,
            verified = outcome.verified,
            missing = outcome.missing,
            errored = outcome.errored,
            updated = outcome.updated.len(),
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Reconciliation completed"
        );
        self.emit(SyncEvent::Completed {
            total: outcome.total,
            verified: outcome.verified,
            missing: outcome.missing,
            errored: outcome.errored,
            updated: outcome.updated.len() as u64,
            duration_ms: outcome.elapsed.as_millis() as u64,
        });

        Ok(outcome)
    }

    /// Verify one record against the remote store without persisting.
    ///
    /// # Errors
    /// The classified verification error when existence could not be
    /// determined, or a catalog error when the record cannot be loaded.
    #[instrument(skip(self, cancel))]
    pub async fn verify_one(
        &self,
        cancel: &CancellationToken,
        id: &str,
    ) -> Result<VerificationResult> {
        let record = self.store.get_record(id).await?;
        let result = self.verify_record(cancel, &record).await;

        match &result.error {
            Some(error) => Err(SyncError::Classified(error.clone())),
            None => Ok(result),
        }
    }

    async fn probe(&self, cancel: &CancellationToken) -> std::result::Result<(), ClassifiedError> {
        let store = self.object_store.as_ref().ok_or_else(|| {
            ClassifiedError::new(ErrorCode::ServiceUnavailable, "no remote store configured")
        })?;

        let deadline = self.config.connectivity_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(classify(SyncError::Cancelled)),
            probe = tokio::time::timeout(deadline, store.test_connectivity()) => {
                match probe {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(classify(e)),
                    Err(elapsed) => Err(classify(elapsed).with_context("probe", store.describe())),
                }
            }
        }
    }

    async fn reconcile_record(
        &self,
        cancel: &CancellationToken,
        record: CatalogRecord,
    ) -> RecordReport {
        if cancel.is_cancelled() {
            return RecordReport {
                result: VerificationResult::failed(&record, classify(SyncError::Cancelled)),
                persist_error: None,
            };
        }

        let result = match tokio::time::timeout(
            self.config.verify_timeout,
            self.verify_record(cancel, &record),
        )
        .await
        {
            Ok(result) => result,
            Err(elapsed) => VerificationResult::failed(&record, classify(elapsed)),
        };

        if let Some(error) = &result.error {
            warn!(record_id = %record.id, code = %error.code(), "Verification failed");
        }

        let persist_error = if result.error.is_none() && result.changed() {
            self.persist(&result).await.err()
        } else {
            None
        };

        RecordReport {
            result,
            persist_error,
        }
    }

    async fn persist(
        &self,
        result: &VerificationResult,
    ) -> std::result::Result<(), ClassifiedError> {
        match self.store.update_status(&result.id, result.new_status).await {
            Ok(()) => {
                info!(
                    record_id = %result.id,
                    from = %result.previous_status,
                    to = %result.new_status,
                    "Corrected record status"
                );
                self.emit(SyncEvent::RecordUpdated {
                    record_id: result.id.clone(),
                    from: result.previous_status.to_string(),
                    to: result.new_status.to_string(),
                });
                Ok(())
            }
            Err(e) => {
                warn!(record_id = %result.id, error = %e, "Failed to persist record status");
                Err(classify(e).with_context("record_id", &result.id))
            }
        }
    }

    async fn verify_record(
        &self,
        cancel: &CancellationToken,
        record: &CatalogRecord,
    ) -> VerificationResult {
        if self.mode.is_offline() {
            debug!(record_id = %record.id, "Offline; assuming active records exist");
            return VerificationResult::unchanged(record, record.status == RecordStatus::Active);
        }

        let Some(store) = &self.object_store else {
            return VerificationResult::failed(
                record,
                ClassifiedError::new(ErrorCode::ServiceUnavailable, "no remote store configured"),
            );
        };

        let exists = retry_with_backoff(cancel, &self.config.retry, || {
            store.check_exists(&record.remote_key)
        })
        .await;

        let existed = match exists {
            Ok(found) => found,
            Err(error) if error.code() == ErrorCode::ObjectNotFound => false,
            Err(error) => return VerificationResult::failed(record, error),
        };

        let now = self.clock.now();
        let candidate = match (existed, record.status) {
            (true, status) if record.is_expired_at(now) && status != RecordStatus::Expired => {
                RecordStatus::Expired
            }
            (true, RecordStatus::Uploading) => RecordStatus::Active,
            (false, RecordStatus::Active) => RecordStatus::Deleted,
            (_, status) => status,
        };

        let new_status = if record.status.can_transition_to(candidate) {
            candidate
        } else {
            record.status
        };

        debug!(
            record_id = %record.id,
            existed,
            from = %record.status,
            to = %new_status,
            "Verified record"
        );

        VerificationResult {
            new_status,
            ..VerificationResult::unchanged(record, existed)
        }
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(event)).ok();
        }
    }
}
