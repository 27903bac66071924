//! Error types for the flashcheck core library

use thiserror::Error;

/// Main error type for flashcheck operations
#[derive(Error, Debug)]
pub enum Error {
    /// Target drive not found or no longer mounted
    #[error("Drive not found: {0}")]
    DeviceNotFound(String),

    /// IO error during read/write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Not enough free space to run a phase
    #[error("Insufficient free space: need {needed} bytes, {available} available")]
    InsufficientSpace {
        /// Bytes the phase needs
        needed: u64,
        /// Bytes available on the volume
        available: u64,
    },

    /// Formatting the drive failed
    #[error("Format failed: {0}")]
    Format(String),

    /// Drive enumeration or filesystem detection failed
    #[error("Drive detection failed: {0}")]
    Detect(String),

    /// Report export failed
    #[error("Report export failed: {0}")]
    Report(String),
}

impl Error {
    /// Whether this error represents a user cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// Result type alias using the flashcheck error type
pub type Result<T> = std::result::Result<T, Error>;
