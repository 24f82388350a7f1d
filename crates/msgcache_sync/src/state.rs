//! Partition lifecycle, statistics and error reports.

use crate::error::SyncError;
use msgcache_core::PartitionId;
use std::fmt;

/// Lifecycle of the active partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionPhase {
    /// Nothing loaded.
    Unloaded,
    /// Reading local entries.
    Loading,
    /// Local entries published, remote fetch not yet complete.
    HydratedStale,
    /// Caught up with the remote as of the last fetch.
    Synced,
}

impl PartitionPhase {
    /// Returns true once local entries have been published.
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::HydratedStale | Self::Synced)
    }
}

/// Why an incremental fetch was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncTrigger {
    /// The application regained the foreground.
    Foreground,
    /// The transport reconnected.
    Reconnect,
    /// The user asked for a refresh.
    Manual,
}

impl ResyncTrigger {
    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Foreground => "foreground",
            Self::Reconnect => "reconnect",
            Self::Manual => "manual",
        }
    }
}

/// Result of an incremental fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Pages were fetched and reconciled.
    Applied {
        /// Pages fetched.
        pages: u32,
        /// Entries received.
        entries: usize,
        /// Cursor after the fetch.
        cursor: Option<u64>,
    },
    /// The partition changed while fetching; results were dropped.
    Discarded,
    /// No partition is active.
    Skipped,
}

/// Counters maintained by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Partitions activated.
    pub activations: u64,
    /// Resync triggers handled.
    pub resyncs: u64,
    /// Pages fetched and applied.
    pub pages_fetched: u64,
    /// Confirmed entries run through the reconciler.
    pub entries_reconciled: u64,
    /// Tentative entries matched to confirmed ones.
    pub matches: u64,
    /// Push batches applied.
    pub pushes_applied: u64,
    /// Drafts submitted.
    pub submits: u64,
    /// Drafts whose submit failed.
    pub submit_failures: u64,
    /// Durable writes that failed.
    pub persistence_failures: u64,
    /// Fetches dropped because the partition changed.
    pub discarded_fetches: u64,
}

/// Operation during which an error was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    /// Reading local entries on activation.
    Hydrate,
    /// Fetching pages.
    Fetch,
    /// Submitting a draft.
    Submit,
    /// Writing to the durable store.
    Persist,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hydrate => "hydrate",
            Self::Fetch => "fetch",
            Self::Submit => "submit",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// An error published on the controller's side channel.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Partition involved, if any.
    pub partition: Option<PartitionId>,
    /// What was being done.
    pub context: ErrorContext,
    /// The error.
    pub error: SyncError,
}
