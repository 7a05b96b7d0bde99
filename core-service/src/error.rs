use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Not signed in to a jukebox: {0}")]
    NotAuthenticated(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Jukebox request failed: {0}")]
    Service(#[from] bridge_traits::BridgeError),
}

impl CoreError {
    /// Whether the host should route the user to the login screen.
    pub fn requires_login(&self) -> bool {
        match self {
            CoreError::NotAuthenticated(_) => true,
            CoreError::Service(e) => e.is_unauthorized(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
