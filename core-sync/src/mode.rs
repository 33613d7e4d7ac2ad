//! Offline mode flag shared by the reconciler and every caller that gates
//! remote work on connectivity.

use crate::classified::{ClassifiedError, ErrorCode};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shared offline/online state
///
/// Hand out one instance behind an `Arc`. Changes are published on a
/// `watch` channel so listeners see the latest value without polling.
#[derive(Debug)]
pub struct ModeController {
    state: watch::Sender<bool>,
    event_bus: Option<EventBus>,
}

impl ModeController {
    /// Starts online.
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn is_offline(&self) -> bool {
        *self.state.borrow()
    }

    /// Flip the flag. Repeating the current value is silent.
    pub fn set_offline(&self, offline: bool) {
        let previous = self.state.send_replace(offline);
        if previous == offline {
            return;
        }

        if offline {
            warn!("Entering offline mode");
        } else {
            info!("Leaving offline mode");
        }

        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Sync(SyncEvent::ModeChanged { offline }))
                .ok();
        }
    }

    /// Receiver that observes every later change
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    /// Fail fast with `ServiceUnavailable` while offline.
    pub fn ensure_online(&self) -> Result<(), ClassifiedError> {
        if self.is_offline() {
            return Err(ClassifiedError::new(
                ErrorCode::ServiceUnavailable,
                "remote store is unavailable while offline",
            )
            .with_context("mode", "offline"));
        }
        Ok(())
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new()
    }
}
