//! # Host Bridge Traits
//!
//! Capability traits the catalog core consumes but does not implement.
//!
//! ## Overview
//!
//! The core keeps a local metadata catalog consistent with a remote object
//! store. Everything that touches the outside world is injected through the
//! traits in this crate so that the reconciliation logic can be exercised
//! against mocks and fixed clocks.
//!
//! ## Traits
//!
//! - [`ObjectStore`](storage::ObjectStore) - Existence checks and connectivity
//!   probes against the authoritative remote store
//! - [`Clock`](time::Clock) - Time source for deterministic expiration checks
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map transport failures onto the dedicated variants
//! (`Timeout`, `Network`, `DnsResolution`) so the core can classify them
//! without string matching.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared between the reconciler and the background sweeper.

pub mod error;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use storage::ObjectStore;
pub use time::{Clock, FixedClock, LogLevel, SystemClock};
