//! Error types for the fraud decision engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, FraudEngineError>;

#[derive(Error, Debug)]
pub enum FraudEngineError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Tool failure: {0}")]
    ToolFailure(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Context source failure: {0}")]
    ContextSourceFailure(String),

    #[error("Reasoning service failure: {0}")]
    ReasoningServiceFailure(String),

    #[error("Response parse failure: {0}")]
    ResponseParseFailure(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}
