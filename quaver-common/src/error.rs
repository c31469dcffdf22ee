//! Common error types for Quaver

use thiserror::Error;

/// Common result type for Quaver operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the daemon and client binding
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (wraps reqwest::Error)
    ///
    /// In the session client a transport failure is the staleness signal.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Event or payload serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session host rejected a request or returned an unexpected status
    #[error("Session host error: {0}")]
    Host(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
