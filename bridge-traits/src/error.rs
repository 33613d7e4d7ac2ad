use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network failure: {message}")]
    Network { message: String, temporary: bool },

    #[error("Could not resolve host {host}")]
    DnsResolution { host: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure happened at the transport layer and may clear up
    /// on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            BridgeError::Timeout(_) => true,
            BridgeError::Network { temporary, .. } => *temporary,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
