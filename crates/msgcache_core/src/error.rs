//! Error types for msgcache core.

use crate::types::{EntryId, PartitionId};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised when an entry violates a partition invariant.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A tentative operation was given a confirmed (or zero) id.
    #[error("entry {id} is not tentative")]
    NotTentative {
        /// The offending id.
        id: EntryId,
    },

    /// An entry was routed to a partition it does not belong to.
    #[error("entry {id} belongs to {actual}, expected {expected}")]
    PartitionMismatch {
        /// The entry id.
        id: EntryId,
        /// Partition of the log.
        expected: PartitionId,
        /// Partition carried by the entry.
        actual: PartitionId,
    },

    /// An id is already present in the partition.
    #[error("duplicate entry id {id}")]
    DuplicateId {
        /// The duplicated id.
        id: EntryId,
    },

    /// The id is not present in the partition.
    #[error("entry {id} not found")]
    EntryNotFound {
        /// The missing id.
        id: EntryId,
    },
}
