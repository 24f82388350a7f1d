//! The durable store interface.

use crate::error::StoreResult;
use msgcache_core::{Entry, EntryId, PartitionId};
use std::sync::Arc;

/// Upserts, deletes and a cursor update that must land together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    /// Entries to insert or replace, keyed by id.
    pub upserts: Vec<Entry>,
    /// Ids to remove.
    pub deletes: Vec<EntryId>,
    /// New sync cursor of a partition, written after the entries.
    pub sync_cursor: Option<(PartitionId, u64)>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an upsert.
    #[must_use]
    pub fn upsert(mut self, entry: Entry) -> Self {
        self.upserts.push(entry);
        self
    }

    /// Adds a delete.
    #[must_use]
    pub fn delete(mut self, id: EntryId) -> Self {
        self.deletes.push(id);
        self
    }

    /// Sets the sync cursor of `partition`.
    #[must_use]
    pub fn with_sync_cursor(mut self, partition: PartitionId, cursor: u64) -> Self {
        self.sync_cursor = Some((partition, cursor));
        self
    }

    /// Returns true if the batch does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.sync_cursor.is_none()
    }
}

/// Crash-resilient storage of entries, indexed by partition.
///
/// Each call is crash-consistent on its own: after a crash, the store holds
/// either all or none of a call's changes. Ids are unique across partitions.
///
/// Implementations use interior mutability so a single store can be shared
/// between the controller and its background workers.
pub trait DurableStore: Send + Sync {
    /// Inserts or replaces entries by id. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    fn batch_upsert(&self, entries: &[Entry]) -> StoreResult<()>;

    /// Removes entries by id. Missing ids are ignored.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    fn batch_delete(&self, ids: &[EntryId]) -> StoreResult<()>;

    /// Returns every stored entry of a partition, in no particular order.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read.
    fn query_by_partition(&self, partition: PartitionId) -> StoreResult<Vec<Entry>>;

    /// Removes every entry of a partition and its sync cursor.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    fn clear_partition(&self, partition: PartitionId) -> StoreResult<()>;

    /// Returns the highest sequence fetched for a partition, if any.
    ///
    /// Entries that arrived outside a fetch may carry higher sequences, so
    /// this is tracked apart from the entries themselves.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read.
    fn sync_cursor(&self, partition: PartitionId) -> StoreResult<Option<u64>>;

    /// Saves the sync cursor of a partition.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    fn set_sync_cursor(&self, partition: PartitionId, cursor: u64) -> StoreResult<()>;

    /// Applies upserts, deletes and the cursor update as one unit.
    ///
    /// The default issues up to three calls. Stores that can write both in one
    /// transaction should override it.
    ///
    /// # Errors
    ///
    /// Fails if the write cannot be made durable.
    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        if !batch.upserts.is_empty() {
            self.batch_upsert(&batch.upserts)?;
        }
        if !batch.deletes.is_empty() {
            self.batch_delete(&batch.deletes)?;
        }
        if let Some((partition, cursor)) = batch.sync_cursor {
            self.set_sync_cursor(partition, cursor)?;
        }
        Ok(())
    }
}

impl<S: DurableStore + ?Sized> DurableStore for Arc<S> {
    fn batch_upsert(&self, entries: &[Entry]) -> StoreResult<()> {
        (**self).batch_upsert(entries)
    }

    fn batch_delete(&self, ids: &[EntryId]) -> StoreResult<()> {
        (**self).batch_delete(ids)
    }

    fn query_by_partition(&self, partition: PartitionId) -> StoreResult<Vec<Entry>> {
        (**self).query_by_partition(partition)
    }

    fn clear_partition(&self, partition: PartitionId) -> StoreResult<()> {
        (**self).clear_partition(partition)
    }

    fn sync_cursor(&self, partition: PartitionId) -> StoreResult<Option<u64>> {
        (**self).sync_cursor(partition)
    }

    fn set_sync_cursor(&self, partition: PartitionId, cursor: u64) -> StoreResult<()> {
        (**self).set_sync_cursor(partition, cursor)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        (**self).apply(batch)
    }
}
