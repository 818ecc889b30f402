//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send timed out")]
    Timeout,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Handshake failed: {0}")]
    Handshake(String),
}

impl Error {
    /// Frame-level errors: the frame is dropped, the session stays up
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_) | Error::FileTooLarge { .. })
    }
}
