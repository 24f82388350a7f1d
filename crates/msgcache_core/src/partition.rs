//! In-memory projection of one partition.

use crate::bucket::OptimisticBucketIndex;
use crate::entry::{Entry, EntryStatus};
use crate::error::{CoreError, CoreResult};
use crate::types::{EntryId, PartitionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// All entries of one partition plus the pending-entry index.
///
/// The log owns the bucket index and keeps it consistent with the entries:
/// removing or failing a tentative entry also unindexes it. Every mutation
/// bumps [`version`](Self::version).
#[derive(Debug, Clone)]
pub struct PartitionLog {
    partition_id: PartitionId,
    entries: HashMap<EntryId, Entry>,
    index: OptimisticBucketIndex,
    version: u64,
}

impl PartitionLog {
    /// Creates an empty partition.
    #[must_use]
    pub fn new(partition_id: PartitionId, pending_ttl: Duration) -> Self {
        Self {
            partition_id,
            entries: HashMap::new(),
            index: OptimisticBucketIndex::new(pending_ttl),
            version: 0,
        }
    }

    /// Builds a partition from stored entries.
    ///
    /// Entries of other partitions are ignored. Stored tentative entries that
    /// are still eligible are re-indexed.
    #[must_use]
    pub fn hydrate(
        partition_id: PartitionId,
        stored: Vec<Entry>,
        pending_ttl: Duration,
        now_ms: i64,
    ) -> Self {
        let mut log = Self::new(partition_id, pending_ttl);
        for entry in stored {
            if entry.partition_id == partition_id {
                log.entries.insert(entry.id, entry);
            }
        }
        log.index.rebuild(log.entries.values(), now_ms);
        log
    }

    /// Partition identifier.
    #[must_use]
    pub const fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    /// Mutation counter.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of entries, including hidden ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the partition holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Returns true if the id is present.
    #[must_use]
    pub fn contains(&self, id: EntryId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Highest sequence among stored entries.
    #[must_use]
    pub fn max_sequence(&self) -> Option<u64> {
        self.entries.values().filter_map(|e| e.sequence).max()
    }

    /// Largest position in the partition.
    #[must_use]
    pub fn last_position(&self) -> Option<f64> {
        self.entries
            .values()
            .filter_map(|e| e.position)
            .filter(|p| p.is_finite())
            .max_by(f64::total_cmp)
    }

    /// Pending-entry index.
    #[must_use]
    pub fn index(&self) -> &OptimisticBucketIndex {
        &self.index
    }

    pub(crate) fn index_mut(&mut self) -> &mut OptimisticBucketIndex {
        &mut self.index
    }

    /// Appends a locally created entry and indexes it for matching.
    ///
    /// # Errors
    ///
    /// Fails if the id is not tentative, already present, or the entry
    /// belongs to another partition.
    pub fn insert_tentative(&mut self, entry: Entry, now_ms: i64) -> CoreResult<()> {
        if !entry.id.is_tentative() {
            return Err(CoreError::NotTentative { id: entry.id });
        }
        self.check_partition(&entry)?;
        if self.entries.contains_key(&entry.id) {
            return Err(CoreError::DuplicateId { id: entry.id });
        }

        self.index.insert(&entry, now_ms);
        self.entries.insert(entry.id, entry);
        self.version += 1;
        Ok(())
    }

    /// Inserts or replaces an entry without merging.
    ///
    /// Returns the previous value.
    ///
    /// # Errors
    ///
    /// Fails if the entry belongs to another partition.
    pub fn upsert(&mut self, entry: Entry) -> CoreResult<Option<Entry>> {
        self.check_partition(&entry)?;
        self.index.remove(entry.id);
        let previous = self.entries.insert(entry.id, entry);
        self.version += 1;
        Ok(previous)
    }

    /// Removes an entry. Returns it if it was present.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        let removed = self.entries.remove(&id)?;
        self.index.remove(id);
        self.version += 1;
        Some(removed)
    }

    /// Marks a tentative entry as failed and stops it from matching.
    ///
    /// Returns the updated entry.
    ///
    /// # Errors
    ///
    /// Fails if the id is missing or not tentative.
    pub fn mark_failed(&mut self, id: EntryId, now_ms: i64) -> CoreResult<Entry> {
        if !id.is_tentative() {
            return Err(CoreError::NotTentative { id });
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(CoreError::EntryNotFound { id })?;
        entry.status = Some(EntryStatus::Failed);
        entry.updated_at = Some(now_ms);
        let updated = entry.clone();

        self.index.remove(id);
        self.version += 1;
        Ok(updated)
    }

    /// All entries in partition order, hidden ones included.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<Entry> {
        let mut all: Vec<Entry> = self.entries.values().cloned().collect();
        all.sort_by(Entry::order_cmp);
        all
    }

    /// Visible entries in partition order.
    #[must_use]
    pub fn visible_entries(&self) -> Vec<Entry> {
        let mut visible: Vec<Entry> = self
            .entries
            .values()
            .filter(|e| e.is_visible())
            .cloned()
            .collect();
        visible.sort_by(Entry::order_cmp);
        visible
    }

    /// Immutable read projection: visible entries in partition order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<[Entry]> {
        self.visible_entries().into()
    }

    fn check_partition(&self, entry: &Entry) -> CoreResult<()> {
        if entry.partition_id == self.partition_id {
            Ok(())
        } else {
            Err(CoreError::PartitionMismatch {
                id: entry.id,
                expected: self.partition_id,
                actual: entry.partition_id,
            })
        }
    }
}
