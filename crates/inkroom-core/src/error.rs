//! Error types for the engine.

use thiserror::Error;

/// Errors that prevent a session from being created.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No rendering surface was provided")]
    MissingSurface,
    #[error("Rendering surface has no drawable area ({width}x{height})")]
    SurfaceUnavailable { width: f64, height: f64 },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Transport errors. Sessions log these and drop the message.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Already connected")]
    AlreadyConnected,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for engine construction.
pub type EngineResult<T> = Result<T, EngineError>;
