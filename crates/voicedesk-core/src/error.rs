use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceDeskError {
    #[error("Config error: {0}")]
    Config(String),

    /// Session endpoint unreachable or rejected.
    #[error("Connect error: {0}")]
    Connect(String),

    /// Send attempted while the channel is not connected.
    #[error("Send error: {0}")]
    Send(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Playback error: {0}")]
    Playback(String),

    /// Malformed or unexpected inbound message.
    #[error("Protocol fault: {0}")]
    Protocol(String),

    #[error("Relay error: {0}")]
    Relay(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoiceDeskError>;
