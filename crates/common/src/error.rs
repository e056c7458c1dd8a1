//! Process-level error types for the blackbox exporter.
//!
//! Only unrecoverable conditions end up here: an unreadable or invalid
//! configuration file, missing raw-socket privileges, or a listener that
//! cannot be bound. Individual probe failures never become an [`Error`].

use std::fmt;

/// A specialized Result type for exporter startup and serving.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient privileges: {0}")]
    Privilege(String),

    #[error("Server error: {0}")]
    Server(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new privilege error.
    pub fn privilege(msg: impl fmt::Display) -> Self {
        Error::Privilege(msg.to_string())
    }

    /// Create a new server error.
    pub fn server(msg: impl fmt::Display) -> Self {
        Error::Server(msg.to_string())
    }
}
