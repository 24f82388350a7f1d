//! # msgcache Store
//!
//! Durable persistence for msgcache entries.
//!
//! This crate provides:
//! - The [`DurableStore`] trait: batch upsert, batch delete, query by
//!   partition and partition clear, plus a per-partition sync cursor
//! - [`LogStore`], a crash-consistent append-log store with an in-memory
//!   index, over any [`LogBackend`]
//! - [`MemoryStore`], a map-backed store with fault injection for tests
//!
//! ## Design Principles
//!
//! - Backends are opaque byte stores (read, append, sync, truncate)
//! - One call writes one checksummed record, so a call lands entirely or
//!   not at all
//! - A torn record at the log tail is the clean end of the log; a checksum
//!   failure anywhere else is corruption
//!
//! ## Example
//!
//! ```rust
//! use msgcache_core::{Entry, EntryId, PartitionId};
//! use msgcache_store::{DurableStore, InMemoryBackend, LogStore, LogStoreConfig};
//!
//! let store = LogStore::open(InMemoryBackend::new(), LogStoreConfig::default()).unwrap();
//! store
//!     .batch_upsert(&[Entry::new(EntryId::new(9), PartitionId::new(1))])
//!     .unwrap();
//! store.batch_delete(&[EntryId::new(9)]).unwrap();
//! assert!(store.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod log_store;
mod memory_store;
mod record;
mod store;

pub use backend::{FileBackend, InMemoryBackend, LogBackend};
pub use error::{StoreError, StoreResult};
pub use log_store::{CompactionStats, LogStore, LogStoreConfig};
pub use memory_store::MemoryStore;
pub use record::{compute_crc32, scan, LogOp, LogRecord, LogScan, RECORD_MAGIC, RECORD_VERSION};
pub use store::{DurableStore, WriteBatch};
