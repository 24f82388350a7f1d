//! # msgcache Sync
//!
//! Keeps a local, durable projection of one partition in step with an
//! authoritative remote source.
//!
//! This crate provides:
//! - [`SyncController`]: activation, incremental fetch, optimistic writes
//!   and push handling for the active partition
//! - [`RemoteSource`]: the network seam, with [`MockRemote`] for tests
//! - A push channel ([`push_channel`]) for confirmed entries delivered
//!   asynchronously
//!
//! ## Read path
//!
//! Reads are served from an immutable in-memory snapshot and never wait for
//! the network. Activation publishes locally stored entries first, then
//! fetches pages after the local cursor.
//!
//! ## Write path
//!
//! Drafts are appended with a negative id and shown right away. The remote's
//! confirmed response and any echo on the push channel are reconciled through
//! the same path, so the draft is replaced exactly once.
//!
//! ## Example
//!
//! ```
//! use msgcache_core::{Entry, EntryId, EntryKind, PartitionId};
//! use msgcache_store::MemoryStore;
//! use msgcache_sync::{MockRemote, SyncConfig, SyncController};
//! use std::sync::Arc;
//!
//! let partition = PartitionId::new(1);
//! let remote = Arc::new(MockRemote::new());
//! let store = Arc::new(MemoryStore::new());
//! let controller = SyncController::new(SyncConfig::default(), remote, store);
//!
//! controller.activate(partition).unwrap();
//! let draft = Entry::new(EntryId::new(0), partition)
//!     .with_kind(EntryKind::Text)
//!     .with_content("hello");
//! let confirmed = controller.append_blocking(draft).unwrap();
//!
//! let entries = controller.get_entries(partition);
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].id, confirmed.id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod controller;
mod error;
mod push;
mod remote;
mod state;

pub use config::SyncConfig;
pub use controller::{OptimisticWrite, SyncController};
pub use error::{SyncError, SyncResult};
pub use push::{push_channel, PushFeed, PushPoll, PushSender};
pub use remote::{FetchCall, FetchPage, MockRemote, RemoteSource};
pub use state::{
    ErrorContext, ErrorReport, FetchOutcome, PartitionPhase, ResyncTrigger, SyncStats,
};
