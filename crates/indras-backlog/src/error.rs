//! Error types for indras-backlog
//!
//! Configuration problems are reported through [`ConfigError`] and are always
//! raised before any suspension point or filesystem access. Everything that
//! can go wrong while reading or writing snapshots is a [`BacklogError`].
//!
//! Running out of values is not an error: `Sequence::get` reports it as `None`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating sequence construction or snapshot arguments
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The initial backlog contained no values
    #[error("An initial value or a non-empty list of values is required")]
    EmptyBacklog,

    /// A back-off delay range was given without any delay values
    #[error("back_off_delay must contain at least one delay value")]
    EmptyBackOffDelay,

    /// The polling budget must be at least one millisecond
    #[error("max_delay must be at least 1ms (got {0:?})")]
    InvalidMaxDelay(Duration),

    /// The polling interval must be non-zero
    #[error("poll_interval must be greater than zero")]
    InvalidPollInterval,

    /// A snapshot path that cannot name a file
    #[error("Invalid snapshot path: {0}")]
    InvalidPath(String),
}

/// Errors that can occur in backlog operations
#[derive(Debug, Error)]
pub enum BacklogError {
    /// Invalid configuration or arguments
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error during snapshot operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// An explicitly requested snapshot does not exist
    #[error("Snapshot not found: {}", .0.display())]
    SnapshotNotFound(PathBuf),
}

impl From<std::io::Error> for BacklogError {
    fn from(err: std::io::Error) -> Self {
        BacklogError::Io(err.to_string())
    }
}

impl BacklogError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Deserialization error
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Whether this error stems from invalid configuration
    pub fn is_config(&self) -> bool {
        matches!(self, BacklogError::Config(_))
    }
}

/// Result type for backlog operations
pub type BacklogResult<T> = Result<T, BacklogError>;
