//! Remote Object Store Abstraction
//!
//! The remote store is the authority on what exists. The core only ever asks
//! two questions of it: does a key exist, and is the store reachable at all.
//! Uploads, authentication and multipart mechanics stay with the host client.

use async_trait::async_trait;

use crate::error::Result;

/// Remote object store trait
///
/// Implemented by the host on top of its S3-compatible (or similar) client.
///
/// # Contract
///
/// - `check_exists` returns `Ok(false)` when the store reports the object is
///   missing. Implementations may instead surface a "no such key" error; the
///   core treats both the same way.
/// - `test_connectivity` should be cheap (a HEAD on the bucket or a list with
///   a page size of one) because it runs before every reconciliation pass.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ObjectStore;
///
/// async fn still_there(store: &dyn ObjectStore, key: &str) -> Result<bool> {
///     store.test_connectivity().await?;
///     store.check_exists(key).await
/// }
/// ```
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check whether an object with the given key exists remotely
    async fn check_exists(&self, key: &str) -> Result<bool>;

    /// Lightweight reachability probe
    async fn test_connectivity(&self) -> Result<()>;

    /// Human readable name used in logs (bucket name, endpoint, ...)
    fn describe(&self) -> String {
        "object-store".to_string()
    }
}
