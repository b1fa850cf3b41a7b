//! Emberbot error types

use thiserror::Error;

/// Emberbot error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing settings, bind failure, duplicate command)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authorization error (token capture, token validation)
    #[error("Authorization error: {0}")]
    Auth(String),

    /// Platform API error (identity resolution, subscription, message send)
    #[error("Platform API error: {0}")]
    Api(String),

    /// Event-stream session error
    #[error("Session error: {0}")]
    Session(String),

    /// Command registration or dispatch error
    #[error("Command error: {0}")]
    Command(String),

    /// Command store error
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Result type alias for emberbot operations
pub type Result<T> = std::result::Result<T, Error>;
