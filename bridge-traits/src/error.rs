use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BridgeError {
    /// True when the remote rejected the caller's credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, BridgeError::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
