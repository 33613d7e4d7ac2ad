//! Logging and event bus demonstration
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run -p core-runtime --example logging_demo
//!
//! # JSON format with a custom filter
//! cargo run -p core-runtime --example logging_demo -- json "core_runtime=trace"
//! ```

use bridge_traits::time::LogLevel;
use core_runtime::events::{CoreEvent, EventBus, LifecycleEvent, SyncEvent};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use std::env;
use tracing::{info, info_span, warn, Instrument};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = args
        .get(1)
        .and_then(|arg| arg.parse::<LogFormat>().ok())
        .unwrap_or_default();

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    if let Err(e) = init_logging(config) {
        eprintln!("failed to initialise logging: {e}");
        return;
    }

    let bus = EventBus::new(16);
    let mut rx = bus.subscribe();

    let listener = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            info!(severity = ?event.severity(), "{}", event.description());
        }
    });

    async {
        bus.emit(CoreEvent::Sync(SyncEvent::Started { total: 3 })).ok();
        bus.emit(CoreEvent::Sync(SyncEvent::RecordUpdated {
            record_id: "demo-1".to_string(),
            from: "active".to_string(),
            to: "deleted".to_string(),
        }))
        .ok();
        warn!(record_id = "demo-2", "Remote check failed");
        bus.emit(CoreEvent::Sync(SyncEvent::Completed {
            total: 3,
            verified: 1,
            missing: 1,
            errored: 1,
            updated: 1,
            duration_ms: 42,
        }))
        .ok();
    }
    .instrument(info_span!("sync_pass"))
    .await;

    bus.emit(CoreEvent::Lifecycle(LifecycleEvent::Swept { expired: 2 }))
        .ok();

    drop(bus);
    listener.await.ok();
}
