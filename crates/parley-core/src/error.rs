//! Error types for Parley Core

use thiserror::Error;

/// Result type alias using Parley Error
pub type Result<T> = std::result::Result<T, Error>;

/// Parley error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No pending request with this ID: {0}")]
    RequestNotFound(String),

    #[error("Message text required")]
    EmptyMessage,

    #[error("Request ID already pending: {0}")]
    DuplicateRequest(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("An event stream is already open for session: {0}")]
    StreamAlreadyOpen(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Failure reported by a conversation engine while producing raw events
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Engine process failed: {0}")]
    Process(String),

    #[error("Engine protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Process(err.to_string())
    }
}
