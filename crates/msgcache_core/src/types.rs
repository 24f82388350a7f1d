//! Identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an entry.
///
/// Negative ids are allocated locally for tentative entries and are never
/// reused. Positive ids are assigned by the remote source and are canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub i64);

impl EntryId {
    /// Creates a new entry ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Returns true for locally allocated, unconfirmed ids.
    #[must_use]
    pub const fn is_tentative(self) -> bool {
        self.0 < 0
    }

    /// Returns true for ids assigned by the remote source.
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_tentative() {
            write!(f, "local:{}", self.0)
        } else {
            write!(f, "entry:{}", self.0)
        }
    }
}

/// Identifier of a partition (one conversation's entry collection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u64);

impl PartitionId {
    /// Creates a new partition ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "partition:{}", self.0)
    }
}
