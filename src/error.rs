//! Error types for the duckgate binary.
//!
//! Engine failures keep their own type ([`duckgate_engine::EngineError`]) and
//! are wrapped here only where the gateway itself fails (startup, config,
//! bind). HTTP responses are built from engine errors directly in
//! [`crate::server::query_api`].

use duckgate_engine::EngineError;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level gateway error
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl GatewayError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }
}
