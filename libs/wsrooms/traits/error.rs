use thiserror::Error;

/// Main error type for wsrooms
#[derive(Error, Debug)]
pub enum WsRoomsError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// No open physical connection to send through
    #[error("Not connected")]
    NotConnected,

    /// Structured payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for wsrooms operations
pub type Result<T> = std::result::Result<T, WsRoomsError>;
