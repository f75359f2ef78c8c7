//! Error types for LzArc operations.
//!
//! I/O failures from the caller-supplied byte sink or source are wrapped as
//! [`LzArcError::Io`]; the remaining variants cover malformed streams as seen
//! by stream-consuming tools (header validation, corrupt data, impossible
//! back-references).

use std::io;
use thiserror::Error;

/// The main error type for LzArc operations.
#[derive(Debug, Error)]
pub enum LzArcError {
    /// I/O error from the underlying reader/writer.
    ///
    /// An encoder propagates this unchanged when its output sink aborts.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid stream header.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// Corrupted data in a compressed stream.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Uncompressed byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid back-reference distance.
    #[error("Invalid back-reference distance: {distance} exceeds history size {history_size}")]
    InvalidDistance {
        /// The invalid distance value.
        distance: u64,
        /// Number of history bytes available.
        history_size: u64,
    },
}

/// Result type alias for LzArc operations.
pub type Result<T> = std::result::Result<T, LzArcError>;

impl LzArcError {
    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid distance error.
    pub fn invalid_distance(distance: u64, history_size: u64) -> Self {
        Self::InvalidDistance {
            distance,
            history_size,
        }
    }
}
