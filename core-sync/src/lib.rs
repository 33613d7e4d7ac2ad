//! # Catalog Sync Core
//!
//! Keeps the local catalog consistent with the remote object store.
//!
//! ## Components
//!
//! - **Error Classifier** (`classifier`): maps any failure into a
//!   [`ClassifiedError`] through an ordered rule list
//! - **Retry Executor** (`retry`): exponential backoff that only retries
//!   recoverable errors and honours cancellation
//! - **Mode Controller** (`mode`): shared offline flag
//! - **Lifecycle Sweeper** (`sweeper`): promotes overdue records to `Expired`
//! - **Reconciler** (`reconciler`): verifies records against the remote store
//!   and writes corrected statuses back

pub mod classified;
pub mod classifier;
pub mod error;
pub mod mode;
pub mod reconciler;
pub mod retry;
pub mod sweeper;

#[cfg(test)]
mod mocks;

pub use classified::{BoxError, ClassifiedError, ErrorCategory, ErrorCode};
pub use classifier::{classify, classify_ref};
pub use error::{Result, SyncError};
pub use mode::ModeController;
pub use reconciler::{Reconciler, ReconcilerConfig, SyncOutcome, VerificationResult};
pub use retry::{retry_with_backoff, should_retry, RetryConfig};
pub use sweeper::{LifecycleSweeper, SweeperConfig};
