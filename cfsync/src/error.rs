//! Error types for cfsync
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for the sync core
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent sync configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// No tokio runtime available for timers and watchers
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Media handle rejected a position write
    #[error("Seek failed: {0}")]
    Seek(String),

    /// Media handle could not report its buffered ranges
    #[error("Buffered ranges unavailable: {0}")]
    Buffered(String),

    /// Structural attachment observation could not be set up
    #[error("Attachment observation unavailable: {0}")]
    Observation(String),

    /// A process-wide manager is already installed
    #[error("Sync manager already installed")]
    AlreadyInstalled,

    /// Errors from the shared library (config loading, I/O)
    #[error(transparent)]
    Common(#[from] cfsync_common::Error),
}

/// Convenience Result type using cfsync Error
pub type Result<T> = std::result::Result<T, Error>;
