use core_sync::{ClassifiedError, SyncError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Background tasks are already running")]
    AlreadyStarted,

    #[error("Service has been shut down")]
    ShutDown,

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),

    #[error(transparent)]
    Remote(#[from] ClassifiedError),
}

impl CoreError {
    /// Classified view for display: user message, suggested action, retry hint
    pub fn classified(&self) -> ClassifiedError {
        match self {
            CoreError::Remote(e) => e.clone(),
            CoreError::Sync(e) => e.classified(),
            other => core_sync::classify_ref(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            CoreError::Sync(e) => e.is_not_found(),
            CoreError::Library(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
