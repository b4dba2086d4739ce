//! Error types for Replay Workbench.

use replay_buffer::BufferError;
use thiserror::Error;

/// Main error type for replay operations above the buffer.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Corrupt packet: {0}")]
    CorruptPacket(String),
}

/// Result type alias for replay operations.
pub type Result<T> = std::result::Result<T, ReplayError>;
