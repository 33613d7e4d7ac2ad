//! Test doubles for the catalog and remote store traits

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::ObjectStore;
use chrono::{DateTime, Utc};
use core_library::{CatalogRecord, CatalogStore, RecordStatus, Result as LibraryResult};
use mockall::mock;

mock! {
    pub Catalog {}

    #[async_trait]
    impl CatalogStore for Catalog {
        async fn get_record(&self, id: &str) -> LibraryResult<CatalogRecord>;
        async fn list_records(&self) -> LibraryResult<Vec<CatalogRecord>>;
        async fn insert_record(&self, record: &CatalogRecord) -> LibraryResult<()>;
        async fn update_status(&self, id: &str, status: RecordStatus) -> LibraryResult<()>;
        async fn update_expiration(&self, id: &str, expires_at: DateTime<Utc>) -> LibraryResult<()>;
        async fn save_config_value(&self, key: &str, value: &str) -> LibraryResult<()>;
        async fn get_config_value(&self, key: &str) -> LibraryResult<String>;
    }
}

mock! {
    pub Remote {}

    #[async_trait]
    impl ObjectStore for Remote {
        async fn check_exists(&self, key: &str) -> BridgeResult<bool>;
        async fn test_connectivity(&self) -> BridgeResult<()>;
    }
}
