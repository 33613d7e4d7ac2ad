//! # Event Bus System
//!
//! Broadcasts typed events from the sync engine to any interested layer (UI,
//! notifications, diagnostics) using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps per-domain enums (`SyncEvent`,
//!   `LifecycleEvent`)
//! - **EventBus**: Cloneable handle around the broadcast sender
//!
//! Emission is best effort. With no subscribers `emit` returns an error that
//! producers ignore with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Lifecycle(LifecycleEvent::Swept { expired: 2 })).ok();
//! assert_eq!(
//!     rx.recv().await.unwrap(),
//!     CoreEvent::Lifecycle(LifecycleEvent::Swept { expired: 2 })
//! );
//! # }
//! ```

use crate::config::DEFAULT_EVENT_BUFFER_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::SendError, Receiver};

/// Top-level event type published through the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Reconciliation and connectivity events
    Sync(SyncEvent),
    /// Expiration sweep events
    Lifecycle(LifecycleEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Lifecycle(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::WentOffline { .. }) => EventSeverity::Warning,
            CoreEvent::Lifecycle(LifecycleEvent::SweepFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { errored, .. }) if *errored > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::ModeChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Reconciliation events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// Connectivity probe succeeded and verification began.
    Started {
        /// Records eligible for verification
        total: u64,
    },
    /// A record's status was corrected.
    RecordUpdated {
        record_id: String,
        from: String,
        to: String,
    },
    /// Pass finished; per-record failures are counted in `errored`.
    Completed {
        total: u64,
        verified: u64,
        missing: u64,
        errored: u64,
        updated: u64,
        duration_ms: u64,
    },
    /// Connectivity probe failed; the core is now offline.
    WentOffline {
        /// User-facing reason
        reason: String,
    },
    /// Offline flag flipped (probe result or explicit override).
    ModeChanged { offline: bool },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Reconciliation started",
            SyncEvent::RecordUpdated { .. } => "Catalog record corrected",
            SyncEvent::Completed { .. } => "Reconciliation completed",
            SyncEvent::WentOffline { .. } => "Remote store unreachable",
            SyncEvent::ModeChanged { .. } => "Offline mode changed",
        }
    }
}

/// Expiration sweep events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    /// Sweep finished; `expired` records were promoted.
    Swept { expired: u64 },
    /// At least one record could not be promoted.
    SweepFailed { failures: u64, message: String },
}

impl LifecycleEvent {
    fn description(&self) -> &str {
        match self {
            LifecycleEvent::Swept { .. } => "Expiration sweep completed",
            LifecycleEvent::SweepFailed { .. } => "Expiration sweep failed",
        }
    }
}

/// Central event bus
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber lagging more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
