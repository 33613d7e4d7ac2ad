//! # Logging
//!
//! Installs a global `tracing` subscriber for the catalog core. Sync and sweep
//! passes run inside spans (`sync_with_remote`, `verify_one`,
//! `cleanup_expired_files`), so span events are on by default and show up as
//! open/close lines.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use std::str::FromStr;
use tracing_subscriber::{
    filter::EnvFilter, fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt,
    Layer, Registry,
};

/// Crates whose verbosity follows `LoggingConfig::level`
const CORE_TARGETS: &[&str] = &[
    "catalog_sync_workspace",
    "core_service",
    "core_sync",
    "core_library",
    "core_runtime",
    "bridge_traits",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for terminals
    Pretty,
    /// One JSON object per event
    Json,
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(Error::Config(format!("Unknown log format '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Raw `EnvFilter` directives; replaces the level-derived filter entirely
    pub filter: Option<String>,
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            span_events: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        let directives = self
            .filter
            .clone()
            .unwrap_or_else(|| level_directives(self.level));
        EnvFilter::try_new(&directives)
            .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = tracing_subscriber::fmt::layer().with_span_events(spans);

        match self.format {
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().with_target(false).boxed(),
            LogFormat::Json => base
                .json()
                .flatten_event(true)
                .with_current_span(self.span_events)
                .with_span_list(false)
                .boxed(),
        }
    }
}

/// Install the global subscriber. Call once at startup.
///
/// # Errors
///
/// `Error::Config` for unparsable filter directives, or when a global
/// subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = config.env_filter()?;

    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Logging already initialized: {}", e)))
}

fn level_directives(level: LogLevel) -> String {
    CORE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level.as_str()))
        .chain(std::iter::once("sqlx=warn".to_string()))
        .collect::<Vec<_>>()
        .join(",")
}
