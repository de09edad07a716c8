// src/error.rs

//! Unified error handling for litwatch.

use thiserror::Error;

/// Result type alias for litwatch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected input (malformed query, empty name, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing saved search or seen result
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a not-found error for a saved search.
    pub fn search_not_found(id: u64) -> Self {
        Self::NotFound {
            kind: "Saved search",
            id,
        }
    }

    /// Create a not-found error for a seen result.
    pub fn result_not_found(id: u64) -> Self {
        Self::NotFound {
            kind: "Seen result",
            id,
        }
    }
}
