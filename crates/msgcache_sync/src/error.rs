//! Error types for the sync controller.

use msgcache_core::{CoreError, EntryId};
use msgcache_store::StoreError;
use std::sync::Arc;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while syncing a partition.
///
/// Errors are cheap to clone so the same error can be returned to the caller
/// and published on the error channel.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// A fetch or submit failed in transit. Local state is untouched.
    #[error("transient network error: {message}")]
    TransientNetwork {
        /// Error message.
        message: String,
    },

    /// The remote source rejected the request.
    #[error("remote rejected request: {0}")]
    Remote(String),

    /// The durable store failed. In-memory state stays authoritative.
    #[error("persistence error: {0}")]
    Persistence(#[source] Arc<StoreError>),

    /// The controller was shut down while the operation ran.
    #[error("sync cancelled")]
    Cancelled,

    /// The entry is not in the active partition.
    #[error("entry {id} not found")]
    EntryNotFound {
        /// The missing id.
        id: EntryId,
    },

    /// A draft or replacement entry cannot be applied.
    #[error("invalid draft: {0}")]
    InvalidDraft(String),
}

impl SyncError {
    /// Creates a transient network error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientNetwork {
            message: message.into(),
        }
    }

    /// Returns true if the caller may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. } | Self::Persistence(_))
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EntryNotFound { id } => Self::EntryNotFound { id },
            other => Self::InvalidDraft(other.to_string()),
        }
    }
}
