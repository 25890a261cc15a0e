//! Error types for Mojarung.
//!
//! Library crates use [`MojarungError`] via `thiserror`.
//! The CLI wraps this with `color-eyre`; the HTTP layer maps it to status codes.

use std::path::PathBuf;

/// Top-level error type for all Mojarung operations.
#[derive(Debug, thiserror::Error)]
pub enum MojarungError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while scraping or calling a remote API.
    #[error("network error: {0}")]
    Network(String),

    /// HTML, JSON or LLM-output parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// LLM provider error (transport, status, or empty reply).
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid input or a violated business rule.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or invalid credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Brokerage or social-feed API error.
    #[error("brokerage error: {0}")]
    Brokerage(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MojarungError>;

impl MojarungError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a not-found error naming the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
