//! # msgcache Core
//!
//! Entry model and optimistic reconciliation engine for msgcache.
//!
//! This crate provides:
//! - The [`Entry`] record and its identifiers
//! - Canonical, volatility-free fingerprints ([`fingerprint`])
//! - The optimistic bucket index for pending local entries
//! - The per-partition projection ([`PartitionLog`])
//! - The [`Reconciler`], which unifies tentative and confirmed entries
//!
//! ## Key Invariants
//!
//! - Confirmed ids are unique; each maps to exactly one stored entry
//! - A partition is always ordered by `(position asc, id asc)`
//! - Applying the same confirmed batch twice is a no-op
//! - When several pending entries share a fingerprint, the oldest matches first
//!
//! The reconciler performs no I/O. It reports what changed and leaves
//! persistence to the caller.
//!
//! ## Example
//!
//! ```
//! use msgcache_core::{Entry, EntryId, EntryKind, PartitionId, PartitionLog, Reconciler};
//! use std::time::Duration;
//!
//! let partition = PartitionId::new(7);
//! let mut log = PartitionLog::new(partition, Duration::from_secs(600));
//!
//! let tentative = Entry::new(EntryId::new(-1), partition)
//!     .with_kind(EntryKind::Text)
//!     .with_content("hi")
//!     .with_position(10.0)
//!     .with_created_at(1_000);
//! log.insert_tentative(tentative, 1_000).unwrap();
//!
//! let echo = Entry::new(EntryId::new(501), partition)
//!     .with_kind(EntryKind::Text)
//!     .with_content("hi")
//!     .with_position(10.0)
//!     .with_sequence(900);
//! let outcome = Reconciler::new().reconcile(&mut log, &[echo], 2_000);
//!
//! assert_eq!(outcome.discarded, vec![EntryId::new(-1)]);
//! assert_eq!(log.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod clock;
mod entry;
mod error;
pub mod fingerprint;
mod partition;
mod reconcile;
mod types;

pub use bucket::OptimisticBucketIndex;
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{position_between, Entry, EntryKind, EntryStatus};
pub use error::{CoreError, CoreResult};
pub use fingerprint::{EntryFingerprints, Fingerprint, FingerprintVariant};
pub use partition::PartitionLog;
pub use reconcile::{MatchRecord, ReconcileOutcome, Reconciler};
pub use types::{EntryId, PartitionId};

/// Default lifetime of a tentative entry before it stops being matchable.
pub const DEFAULT_PENDING_TTL: std::time::Duration = std::time::Duration::from_secs(10 * 60);
