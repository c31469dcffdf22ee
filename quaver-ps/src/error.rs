//! Error types for quaver-ps
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the playback session daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Playback engine errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio sink errors
    #[error("Audio sink error: {0}")]
    Sink(String),

    /// Catalog fetch errors
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] quaver_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using quaver-ps Error
pub type Result<T> = std::result::Result<T, Error>;
