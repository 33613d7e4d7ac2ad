use crate::classified::ClassifiedError;
use crate::reconciler::SyncOutcome;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{entity_type} {id} not found")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// Connectivity probe failed; the outcome carries `offline = true`.
    #[error("Remote store unreachable: {cause}")]
    Offline {
        outcome: Box<SyncOutcome>,
        cause: ClassifiedError,
    },

    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error("Failed to expire {} record(s): {}", .failures.len(), .failures.join("; "))]
    Cleanup { failures: Vec<String> },

    #[error("Catalog error: {0}")]
    Library(#[from] LibraryError),

    #[error("Sync timeout after {0} seconds")]
    Timeout(u64),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether this error means the requested record or key does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::NotFound { .. } => true,
            SyncError::Library(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// The classified form of this error.
    pub fn classified(&self) -> ClassifiedError {
        match self {
            SyncError::Classified(e) => e.clone(),
            SyncError::Offline { cause, .. } => cause.clone(),
            other => crate::classifier::classify_ref(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
