use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Jukebox rejected the session: {0}")]
    AuthenticationRequired(String),

    #[error("Current song unavailable: {0}")]
    CurrentSongUnavailable(String),

    #[error("Push channel gave up after {attempts} attempts")]
    PushChannelExhausted { attempts: u32 },

    #[error("Invalid jukebox base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Service error: {0}")]
    Service(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
