//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing durable state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the backend.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current backend size.
        size: u64,
    },

    /// The log contains a structurally invalid record.
    #[error("log corrupted: {0}")]
    Corrupted(String),

    /// A record failed its checksum.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The stored checksum.
        expected: u32,
        /// The computed checksum.
        actual: u32,
    },

    /// A record payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Creates an unavailability error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

impl<T: std::fmt::Debug> From<ciborium::ser::Error<T>> for StoreError {
    fn from(err: ciborium::ser::Error<T>) -> Self {
        Self::Codec(err.to_string())
    }
}

impl<T: std::fmt::Debug> From<ciborium::de::Error<T>> for StoreError {
    fn from(err: ciborium::de::Error<T>) -> Self {
        Self::Codec(err.to_string())
    }
}
