//! Append-log store with an in-memory index.
//!
//! Every call appends one framed [`LogRecord`](crate::LogRecord) and then
//! updates the index. On open the log is replayed from the start; a torn
//! record at the tail is cut off, a checksum failure is fatal.
//!
//! Superseded records accumulate until [`LogStore::compact`] rewrites the
//! log as a single record of live entries and cursors.

use crate::backend::{FileBackend, InMemoryBackend, LogBackend};
use crate::error::StoreResult;
use crate::record::{scan, LogOp, LogRecord};
use crate::store::{DurableStore, WriteBatch};
use msgcache_core::{Entry, EntryId, PartitionId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Configuration for a [`LogStore`].
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Sync the backend after every write.
    pub sync_on_write: bool,
    /// Compact automatically once this many superseded ops pile up and they
    /// outnumber live entries. `None` disables automatic compaction.
    pub auto_compact_after: Option<usize>,
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            auto_compact_after: None,
        }
    }
}

impl LogStoreConfig {
    /// Sets whether every write is synced.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Enables automatic compaction past `stale_ops` superseded ops.
    #[must_use]
    pub fn with_auto_compact_after(mut self, stale_ops: usize) -> Self {
        self.auto_compact_after = Some(stale_ops);
        self
    }
}

/// Outcome of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Entries carried over.
    pub live_entries: usize,
    /// Superseded ops dropped.
    pub dropped_ops: usize,
}

#[derive(Debug, Default)]
struct Index {
    entries: HashMap<EntryId, Entry>,
    partitions: HashMap<PartitionId, HashSet<EntryId>>,
    cursors: HashMap<PartitionId, u64>,
    stale_ops: usize,
}

impl Index {
    fn apply(&mut self, op: LogOp) {
        match op {
            LogOp::Upsert(entry) => {
                let id = entry.id;
                let partition = entry.partition_id;
                if let Some(previous) = self.entries.insert(id, entry) {
                    self.stale_ops += 1;
                    if previous.partition_id != partition {
                        self.unlink(previous.partition_id, id);
                    }
                }
                self.partitions.entry(partition).or_default().insert(id);
            }
            LogOp::Delete(id) => {
                self.stale_ops += 1;
                if let Some(previous) = self.entries.remove(&id) {
                    self.stale_ops += 1;
                    self.unlink(previous.partition_id, id);
                }
            }
            LogOp::ClearPartition(partition) => {
                self.stale_ops += 1;
                if self.cursors.remove(&partition).is_some() {
                    self.stale_ops += 1;
                }
                if let Some(ids) = self.partitions.remove(&partition) {
                    for id in ids {
                        if self.entries.remove(&id).is_some() {
                            self.stale_ops += 1;
                        }
                    }
                }
            }
            LogOp::SetCursor(partition, cursor) => {
                if self.cursors.insert(partition, cursor).is_some() {
                    self.stale_ops += 1;
                }
            }
        }
    }

    fn unlink(&mut self, partition: PartitionId, id: EntryId) {
        if let Some(ids) = self.partitions.get_mut(&partition) {
            ids.remove(&id);
            if ids.is_empty() {
                self.partitions.remove(&partition);
            }
        }
    }
}

struct Inner<B> {
    backend: B,
    index: Index,
}

/// A [`DurableStore`] over an append-only [`LogBackend`].
///
/// ```rust
/// use msgcache_core::{Entry, EntryId, PartitionId};
/// use msgcache_store::{DurableStore, LogStore};
///
/// let store = LogStore::in_memory();
/// let entry = Entry::new(EntryId::new(1), PartitionId::new(3)).with_content("hi");
/// store.batch_upsert(&[entry]).unwrap();
/// assert_eq!(store.query_by_partition(PartitionId::new(3)).unwrap().len(), 1);
/// ```
pub struct LogStore<B: LogBackend> {
    config: LogStoreConfig,
    inner: RwLock<Inner<B>>,
}

impl LogStore<InMemoryBackend> {
    /// Creates an empty store in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            config: LogStoreConfig::default().with_sync_on_write(false),
            inner: RwLock::new(Inner {
                backend: InMemoryBackend::new(),
                index: Index::default(),
            }),
        }
    }
}

impl LogStore<FileBackend> {
    /// Opens or creates a log file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or recovery fails.
    pub fn open_file(path: &Path, config: LogStoreConfig) -> StoreResult<Self> {
        Self::open(FileBackend::open_with_create_dirs(path)?, config)
    }
}

impl<B: LogBackend> LogStore<B> {
    /// Opens a store over `backend`, replaying its log.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors and on corrupt records other than a torn tail.
    pub fn open(mut backend: B, config: LogStoreConfig) -> StoreResult<Self> {
        let scanned = scan(&backend)?;
        if scanned.torn_tail {
            let size = backend.size()?;
            tracing::warn!(
                valid_len = scanned.valid_len,
                size,
                "discarding torn record at log tail"
            );
            backend.truncate(scanned.valid_len)?;
        }

        let mut index = Index::default();
        let records = scanned.records.len();
        for record in scanned.records {
            for op in record.ops {
                index.apply(op);
            }
        }
        tracing::info!(
            records,
            entries = index.entries.len(),
            partitions = index.partitions.len(),
            "opened entry log"
        );

        Ok(Self {
            config,
            inner: RwLock::new(Inner { backend, index }),
        })
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().index.entries.len()
    }

    /// Returns true if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<Entry> {
        self.inner.read().index.entries.get(&id).cloned()
    }

    /// Ops in the log that no longer contribute to live state.
    #[must_use]
    pub fn stale_ops(&self) -> usize {
        self.inner.read().index.stale_ops
    }

    /// Current log size in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the backend size cannot be read.
    pub fn size_bytes(&self) -> StoreResult<u64> {
        self.inner.read().backend.size()
    }

    /// Consumes the store and returns its backend.
    pub fn into_backend(self) -> B {
        self.inner.into_inner().backend
    }

    /// Rewrites the log as one record holding every live entry and cursor.
    ///
    /// Logical state is unchanged.
    ///
    /// # Errors
    ///
    /// Fails if the new log cannot be written.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut inner = self.inner.write();
        Self::compact_locked(&mut inner)
    }

    fn compact_locked(inner: &mut Inner<B>) -> StoreResult<CompactionStats> {
        let bytes_before = inner.backend.size()?;

        let mut live: Vec<Entry> = inner.index.entries.values().cloned().collect();
        live.sort_by_key(|e| e.id);
        let live_entries = live.len();

        let mut cursors: Vec<(PartitionId, u64)> =
            inner.index.cursors.iter().map(|(p, c)| (*p, *c)).collect();
        cursors.sort_unstable();

        let ops: Vec<LogOp> = live
            .into_iter()
            .map(LogOp::Upsert)
            .chain(cursors.into_iter().map(|(p, c)| LogOp::SetCursor(p, c)))
            .collect();
        let bytes = if ops.is_empty() {
            Vec::new()
        } else {
            LogRecord::new(ops).encode()?
        };
        inner.backend.replace_all(&bytes)?;

        let dropped_ops = std::mem::take(&mut inner.index.stale_ops);
        let stats = CompactionStats {
            bytes_before,
            bytes_after: bytes.len() as u64,
            live_entries,
            dropped_ops,
        };
        tracing::debug!(?stats, "compacted entry log");
        Ok(stats)
    }

    fn write(&self, ops: Vec<LogOp>) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let record = LogRecord::new(ops);
        let bytes = record.encode()?;

        let mut inner = self.inner.write();
        let before = inner.backend.size()?;
        if let Err(err) = inner.backend.append(&bytes) {
            if let Err(rollback) = inner.backend.truncate(before) {
                tracing::warn!(error = %rollback, "failed to cut partial record");
            }
            return Err(err);
        }
        if self.config.sync_on_write {
            inner.backend.sync()?;
        }

        for op in record.ops {
            inner.index.apply(op);
        }

        if let Some(threshold) = self.config.auto_compact_after {
            let index = &inner.index;
            if index.stale_ops >= threshold && index.stale_ops > index.entries.len() {
                Self::compact_locked(&mut inner)?;
            }
        }
        Ok(())
    }
}

impl<B: LogBackend> DurableStore for LogStore<B> {
    fn batch_upsert(&self, entries: &[Entry]) -> StoreResult<()> {
        self.write(entries.iter().cloned().map(LogOp::Upsert).collect())
    }

    fn batch_delete(&self, ids: &[EntryId]) -> StoreResult<()> {
        self.write(ids.iter().copied().map(LogOp::Delete).collect())
    }

    fn query_by_partition(&self, partition: PartitionId) -> StoreResult<Vec<Entry>> {
        let inner = self.inner.read();
        let index = &inner.index;
        Ok(index
            .partitions
            .get(&partition)
            .into_iter()
            .flatten()
            .filter_map(|id| index.entries.get(id).cloned())
            .collect())
    }

    fn clear_partition(&self, partition: PartitionId) -> StoreResult<()> {
        self.write(vec![LogOp::ClearPartition(partition)])
    }

    fn sync_cursor(&self, partition: PartitionId) -> StoreResult<Option<u64>> {
        Ok(self.inner.read().index.cursors.get(&partition).copied())
    }

    fn set_sync_cursor(&self, partition: PartitionId, cursor: u64) -> StoreResult<()> {
        self.write(vec![LogOp::SetCursor(partition, cursor)])
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        let ops = batch
            .upserts
            .iter()
            .cloned()
            .map(LogOp::Upsert)
            .chain(batch.deletes.iter().copied().map(LogOp::Delete))
            .chain(batch.sync_cursor.map(|(p, c)| LogOp::SetCursor(p, c)))
            .collect();
        self.write(ops)
    }
}

impl<B: LogBackend> std::fmt::Debug for LogStore<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("LogStore")
            .field("entries", &inner.index.entries.len())
            .field("partitions", &inner.index.partitions.len())
            .field("stale_ops", &inner.index.stale_ops)
            .finish()
    }
}
