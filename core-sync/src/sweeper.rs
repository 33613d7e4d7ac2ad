//! # Lifecycle Sweeper
//!
//! Promotes records past their expiration deadline to `Expired`. Works purely
//! against the local catalog; no network access.
//!
//! A record whose deadline equals "now" to the microsecond is already
//! expired (`expires_at <= now`).

use crate::error::{Result, SyncError};
use bridge_traits::Clock;
use chrono::Duration as ChronoDuration;
use core_library::{CatalogRecord, CatalogStore, RecordStatus};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Shortest period `run` accepts; smaller intervals are raised to it
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

impl From<&SyncSettings> for SweeperConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            interval: settings.sweep_interval,
        }
    }
}

pub struct LifecycleSweeper {
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    event_bus: Option<EventBus>,
}

impl LifecycleSweeper {
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Records at or past their deadline that are neither Expired nor Deleted.
    pub async fn check_expirations(&self) -> Result<Vec<CatalogRecord>> {
        let now = self.clock.now();
        let records = self.store.list_records().await?;

        Ok(records
            .into_iter()
            .filter(|record| !record.status.is_terminal() && record.is_expired_at(now))
            .collect())
    }

    /// Mark every overdue record `Expired`.
    ///
    /// Keeps going past individual failures. Returns the number of records
    /// updated, or `SyncError::Cleanup` listing every failure.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_files(&self) -> Result<usize> {
        let overdue = self.check_expirations().await?;
        if overdue.is_empty() {
            debug!("No expired records");
            self.emit(LifecycleEvent::Swept { expired: 0 });
            return Ok(0);
        }

        let mut expired = 0;
        let mut failures = Vec::new();

        for record in &overdue {
            match self
                .store
                .update_status(&record.id, RecordStatus::Expired)
                .await
            {
                Ok(()) => {
                    debug!(record_id = %record.id, from = %record.status, "Record expired");
                    expired += 1;
                }
                Err(e) => {
                    warn!(record_id = %record.id, error = %e, "Failed to expire record");
                    failures.push(format!("{}: {}", record.id, e));
                }
            }
        }

        if !failures.is_empty() {
            let error = SyncError::Cleanup { failures };
            self.emit(LifecycleEvent::SweepFailed {
                failures: (overdue.len() - expired) as u64,
                message: error.to_string(),
            });
            return Err(error);
        }

        info!(expired, "Expired overdue records");
        self.emit(LifecycleEvent::Swept {
            expired: expired as u64,
        });
        Ok(expired)
    }

    pub async fn is_file_expired(&self, id: &str) -> Result<bool> {
        let record = self.store.get_record(id).await?;
        Ok(record.status == RecordStatus::Expired || record.is_expired_at(self.clock.now()))
    }

    /// Time left before the deadline; zero once it has passed.
    pub async fn time_until_expiration(&self, id: &str) -> Result<Duration> {
        let record = self.store.get_record(id).await?;
        Ok(record.time_until_expiration(self.clock.now()))
    }

    /// Move the deadline to `now + ttl`. `ttl` must be non-zero.
    pub async fn set_expiration(&self, id: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            return Err(SyncError::InvalidInput {
                field: "ttl".to_string(),
                message: "expiration must be greater than zero".to_string(),
            });
        }

        let ttl = ChronoDuration::from_std(ttl).map_err(|_| SyncError::InvalidInput {
            field: "ttl".to_string(),
            message: format!("expiration of {:?} is out of range", ttl),
        })?;
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| SyncError::InvalidInput {
                field: "ttl".to_string(),
                message: "expiration overflows the calendar".to_string(),
            })?;

        self.store.update_expiration(id, expires_at).await?;
        debug!(record_id = %id, %expires_at, "Expiration updated");
        Ok(())
    }

    /// Sweep every `interval` until `cancel` fires. The first sweep runs
    /// immediately; failures are logged and the loop continues. Intervals
    /// below [`MIN_SWEEP_INTERVAL`] are raised to it.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        if interval < MIN_SWEEP_INTERVAL {
            warn!(?interval, "Sweep interval too small, using minimum");
        }
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = interval.as_secs(), "Lifecycle sweeper started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_expired_files().await {
                        warn!(error = %e, "Lifecycle sweep failed");
                    }
                }
            }
        }
        info!("Lifecycle sweeper stopped");
    }

    /// Run [`run`](Self::run) on its own task.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(interval, cancel).await })
    }

    fn emit(&self, event: LifecycleEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Lifecycle(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockCatalog;
    use bridge_traits::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use core_library::LibraryError;
    use mockall::predicate::eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(id: &str, status: RecordStatus, expires_in: ChronoDuration) -> CatalogRecord {
        let mut record = CatalogRecord::new(
            id,
            format!("/data/{}", id),
            10,
            format!("shares/{}", id),
            now() - ChronoDuration::days(1),
            now() + expires_in,
        )
        .with_status(status);
        record.id = id.to_string();
        record
    }

    fn sweeper(store: MockCatalog) -> LifecycleSweeper {
        LifecycleSweeper::new(Arc::new(store), Arc::new(FixedClock::new(now())))
    }

    #[tokio::test]
    async fn test_check_expirations_filters_terminal_and_future() {
        let mut store = MockCatalog::new();
        store.expect_list_records().returning(|| {
            Ok(vec![
                record("due", RecordStatus::Active, ChronoDuration::hours(-1)),
                record("exact", RecordStatus::Uploading, ChronoDuration::zero()),
                record("future", RecordStatus::Active, ChronoDuration::hours(1)),
                record("expired", RecordStatus::Expired, ChronoDuration::hours(-2)),
                record("deleted", RecordStatus::Deleted, ChronoDuration::hours(-2)),
                record("failed", RecordStatus::Error, ChronoDuration::hours(-2)),
            ])
        });

        let due: Vec<String> = sweeper(store)
            .check_expirations()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(due, vec!["due", "exact", "failed"]);
    }

    #[tokio::test]
    async fn test_cleanup_aggregates_failures() {
        let mut store = MockCatalog::new();
        store.expect_list_records().returning(|| {
            Ok(vec![
                record("a", RecordStatus::Active, ChronoDuration::hours(-1)),
                record("b", RecordStatus::Active, ChronoDuration::hours(-1)),
                record("c", RecordStatus::Active, ChronoDuration::hours(-1)),
            ])
        });
        store
            .expect_update_status()
            .with(eq("b"), eq(RecordStatus::Expired))
            .returning(|_, _| Err(LibraryError::Migration("disk full".to_string())));
        store
            .expect_update_status()
            .withf(|id, status| id != "b" && *status == RecordStatus::Expired)
            .times(2)
            .returning(|_, _| Ok(()));

        let bus = EventBus::new(4);
        let mut events = bus.subscribe();
        let err = sweeper(store)
            .with_event_bus(bus)
            .cleanup_expired_files()
            .await
            .unwrap_err();

        match err {
            SyncError::Cleanup { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("b: "));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Lifecycle(LifecycleEvent::SweepFailed { failures: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_cleanup_with_nothing_due_is_ok() {
        let mut store = MockCatalog::new();
        store.expect_list_records().returning(|| Ok(vec![]));
        store.expect_update_status().never();

        assert_eq!(sweeper(store).cleanup_expired_files().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_time_until_expiration_clamps_at_zero() {
        let mut store = MockCatalog::new();
        store
            .expect_get_record()
            .with(eq("past"))
            .returning(|_| Ok(record("past", RecordStatus::Active, ChronoDuration::hours(-1))));
        store
            .expect_get_record()
            .with(eq("soon"))
            .returning(|_| Ok(record("soon", RecordStatus::Active, ChronoDuration::minutes(5))));

        let sweeper = sweeper(store);
        assert_eq!(sweeper.time_until_expiration("past").await.unwrap(), Duration::ZERO);
        assert_eq!(
            sweeper.time_until_expiration("soon").await.unwrap(),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn test_set_expiration_rejects_zero() {
        let mut store = MockCatalog::new();
        store.expect_update_expiration().never();

        let err = sweeper(store)
            .set_expiration("a", Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_set_expiration_from_clock() {
        let mut store = MockCatalog::new();
        store
            .expect_update_expiration()
            .withf(|id, at| id == "a" && *at == now() + ChronoDuration::hours(2))
            .times(1)
            .returning(|_, _| Ok(()));

        sweeper(store)
            .set_expiration("a", Duration::from_secs(7200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let mut store = MockCatalog::new();
        store.expect_list_records().returning(|| Ok(vec![]));

        let sweeper = Arc::new(sweeper(store));
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(Duration::from_millis(10), cancel.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_with_zero_interval_still_sweeps() {
        let mut store = MockCatalog::new();
        store.expect_list_records().returning(|| Ok(vec![]));

        let sweeper = Arc::new(sweeper(store));
        let cancel = CancellationToken::new();
        let handle = sweeper.spawn(Duration::ZERO, cancel.clone());

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop promptly")
            .expect("zero interval must not panic the sweeper task");
    }
}
