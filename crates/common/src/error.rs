use thiserror::Error;

/// Error types shared by the relay and the agent
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("Failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Registration rejected ({status}): {message}")]
    Registration { status: u16, message: String },

    #[error("Relay reported an error: {0}")]
    Relay(String),

    #[error("Tunnel closed")]
    Closed,

    #[error("Local service unavailable: {0}")]
    LocalService(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
