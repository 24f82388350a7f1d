//! Map-backed store with fault injection.

use crate::error::{StoreError, StoreResult};
use crate::store::{DurableStore, WriteBatch};
use msgcache_core::{Entry, EntryId, PartitionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// A [`DurableStore`] that keeps everything in a map.
///
/// It records every successful write batch and can be switched into a
/// failing mode, which makes it the store of choice for controller tests.
///
/// ```rust
/// use msgcache_core::{Entry, EntryId, PartitionId};
/// use msgcache_store::{DurableStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.set_failing(true);
/// let entry = Entry::new(EntryId::new(1), PartitionId::new(1));
/// assert!(store.batch_upsert(&[entry]).is_err());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<EntryId, Entry>>,
    cursors: RwLock<HashMap<PartitionId, u64>>,
    writes: RwLock<Vec<WriteBatch>>,
    failing: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `entries`. The seed is not recorded as a write.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = Entry>) -> Self {
        let store = Self::new();
        store
            .entries
            .write()
            .extend(entries.into_iter().map(|e| (e.id, e)));
        store
    }

    /// Makes every following call fail with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<Entry> {
        self.entries.read().get(&id).cloned()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Successful write batches, oldest first.
    #[must_use]
    pub fn writes(&self) -> Vec<WriteBatch> {
        self.writes.read().clone()
    }

    /// Forgets recorded writes.
    pub fn clear_writes(&self) {
        self.writes.write().clear();
    }

    fn check(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store is failing"))
        } else {
            Ok(())
        }
    }
}

impl DurableStore for MemoryStore {
    fn batch_upsert(&self, entries: &[Entry]) -> StoreResult<()> {
        self.apply(&WriteBatch {
            upserts: entries.to_vec(),
            ..WriteBatch::default()
        })
    }

    fn batch_delete(&self, ids: &[EntryId]) -> StoreResult<()> {
        self.apply(&WriteBatch {
            deletes: ids.to_vec(),
            ..WriteBatch::default()
        })
    }

    fn query_by_partition(&self, partition: PartitionId) -> StoreResult<Vec<Entry>> {
        self.check()?;
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| e.partition_id == partition)
            .cloned()
            .collect())
    }

    fn clear_partition(&self, partition: PartitionId) -> StoreResult<()> {
        self.check()?;
        self.entries
            .write()
            .retain(|_, e| e.partition_id != partition);
        self.cursors.write().remove(&partition);
        Ok(())
    }

    fn sync_cursor(&self, partition: PartitionId) -> StoreResult<Option<u64>> {
        self.check()?;
        Ok(self.cursors.read().get(&partition).copied())
    }

    fn set_sync_cursor(&self, partition: PartitionId, cursor: u64) -> StoreResult<()> {
        self.apply(&WriteBatch::new().with_sync_cursor(partition, cursor))
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        self.check()?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.write();
        for entry in &batch.upserts {
            entries.insert(entry.id, entry.clone());
        }
        for id in &batch.deletes {
            entries.remove(id);
        }
        if let Some((partition, cursor)) = batch.sync_cursor {
            self.cursors.write().insert(partition, cursor);
        }
        self.writes.write().push(batch.clone());
        Ok(())
    }
}
