//! Common error types for AgentLoop
//!
//! This module defines all error types used across the AgentLoop system.
//! All errors map onto an HTTP status code so handlers can propagate them with `?`.

use std::net::AddrParseError;
use thiserror::Error;

/// Main error type for AgentLoop
#[derive(Error, Debug)]
pub enum AgentLoopError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Language model endpoint errors (network, quota, malformed reply)
    #[error("Model error: {0}")]
    Model(String),

    /// Client channel delivery errors
    #[error("Channel error: {0}")]
    Channel(String),

    /// Requested entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<AddrParseError> for AgentLoopError {
    fn from(err: AddrParseError) -> Self {
        AgentLoopError::Parse(err.to_string())
    }
}

impl From<config::ConfigError> for AgentLoopError {
    fn from(err: config::ConfigError) -> Self {
        AgentLoopError::Config(err.to_string())
    }
}

impl AgentLoopError {
    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AgentLoopError::NotFound(_) => 404,
            AgentLoopError::InvalidInput(_) | AgentLoopError::Parse(_) => 400,
            AgentLoopError::Serialization(_) => 422,
            AgentLoopError::Model(_) => 502,
            AgentLoopError::Timeout(_) => 504,
            AgentLoopError::Channel(_) => 503,
            AgentLoopError::Config(_) | AgentLoopError::Io(_) => 500,
        }
    }

    /// Stable machine-readable code for error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AgentLoopError::Config(_) => "CONFIG_ERROR",
            AgentLoopError::Model(_) => "MODEL_ERROR",
            AgentLoopError::Channel(_) => "CHANNEL_ERROR",
            AgentLoopError::NotFound(_) => "NOT_FOUND",
            AgentLoopError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentLoopError::Io(_) => "IO_ERROR",
            AgentLoopError::InvalidInput(_) => "INVALID_INPUT",
            AgentLoopError::Timeout(_) => "TIMEOUT",
            AgentLoopError::Parse(_) => "PARSE_ERROR",
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentLoopError::Config(msg.into())
    }

    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        AgentLoopError::Model(msg.into())
    }

    /// Create a channel error
    pub fn channel(msg: impl Into<String>) -> Self {
        AgentLoopError::Channel(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        AgentLoopError::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AgentLoopError::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        AgentLoopError::Timeout(msg.into())
    }
}

/// Result type alias for AgentLoop operations
pub type Result<T> = std::result::Result<T, AgentLoopError>;
