//! Shared fixtures for core-sync integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{FixedClock, ObjectStore};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use core_library::{create_test_pool, CatalogRecord, CatalogStore, RecordStatus, SqliteCatalogStore};
use core_sync::{ReconcilerConfig, RetryConfig};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Remote store backed by an in-memory key set
pub struct FakeObjectStore {
    objects: AsyncMutex<HashSet<String>>,
    failures: AsyncMutex<HashMap<String, String>>,
    reachable: AtomicBool,
    probe_delay: Option<Duration>,
    check_calls: AtomicU32,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self {
            objects: AsyncMutex::new(HashSet::new()),
            failures: AsyncMutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            probe_delay: None,
            check_calls: AtomicU32::new(0),
        }
    }

    /// Probe sleeps this long before answering
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    pub async fn put(&self, key: &str) {
        self.objects.lock().await.insert(key.to_string());
    }

    /// `check_exists(key)` fails with `message`
    pub async fn fail_key(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .await
            .insert(key.to_string(), message.to_string());
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn check_calls(&self) -> u32 {
        self.check_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn check_exists(&self, key: &str) -> BridgeResult<bool> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.failures.lock().await.get(key) {
            return Err(BridgeError::OperationFailed(message.clone()));
        }
        Ok(self.objects.lock().await.contains(key))
    }

    async fn test_connectivity(&self) -> BridgeResult<()> {
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }

        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::Network {
                message: "connection refused".to_string(),
                temporary: true,
            })
        }
    }

    fn describe(&self) -> String {
        "fake-object-store".to_string()
    }
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(now()))
}

pub async fn catalog() -> Arc<SqliteCatalogStore> {
    Arc::new(SqliteCatalogStore::new(create_test_pool().await.unwrap()))
}

/// Insert a record whose remote key is `shares/<name>`
pub async fn seed(
    store: &SqliteCatalogStore,
    name: &str,
    status: RecordStatus,
    expires_in: ChronoDuration,
) -> CatalogRecord {
    let record = CatalogRecord::new(
        name,
        format!("/home/user/{}", name),
        1024,
        format!("shares/{}", name),
        now() - ChronoDuration::days(1),
        now() + expires_in,
    )
    .with_status(status);

    store.insert_record(&record).await.unwrap();
    record
}

pub fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig {
        connectivity_timeout: Duration::from_millis(200),
        verify_timeout: Duration::from_secs(2),
        max_concurrent_verifications: 3,
        retry: RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        },
    }
}
