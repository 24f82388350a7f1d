//! Reconciliation of confirmed entries against the partition projection.
//!
//! Every confirmed entry, whether it is the direct response to a local write,
//! a pushed entry or a row of a fetched page, goes through [`Reconciler`].
//! It is the single place where tentative and confirmed entries are unified.
//!
//! ## Algorithm
//!
//! For each confirmed entry in the batch:
//!
//! 1. If the id is already stored, merge field by field. Fields absent from
//!    the incoming entry keep their stored value.
//! 2. Otherwise try to consume a pending tentative entry by exact key, then
//!    by loose key, then (media kinds only) by media-loose key.
//! 3. A matched tentative entry is discarded; its id is never reused.
//! 4. The confirmed entry is inserted as new.
//!
//! Only entries whose stored representation changed are reported in
//! [`ReconcileOutcome::upserted`], so the caller can persist them in one batch.

use crate::entry::Entry;
use crate::fingerprint::{EntryFingerprints, FingerprintVariant};
use crate::partition::PartitionLog;
use crate::types::EntryId;
use std::collections::HashMap;

/// A tentative entry that was unified with a confirmed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRecord {
    /// The discarded local id.
    pub tentative_id: EntryId,
    /// The confirmed id that replaced it.
    pub confirmed_id: EntryId,
    /// Which fingerprint produced the match.
    pub variant: FingerprintVariant,
}

/// What a reconciliation call changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Entries whose stored form differs from before the call, one per id,
    /// in first-touch order.
    pub upserted: Vec<Entry>,
    /// Tentative ids removed because they were matched.
    pub discarded: Vec<EntryId>,
    /// Matches made during this call.
    pub matches: Vec<MatchRecord>,
    /// Confirmed entries inserted as new.
    pub inserted: usize,
    /// Existing entries changed by a merge.
    pub merged: usize,
    /// Incoming entries that changed nothing.
    pub unchanged: usize,
    /// Incoming entries rejected (tentative id or foreign partition).
    pub skipped: usize,
}

impl ReconcileOutcome {
    /// Returns true if nothing needs to be persisted.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.upserted.is_empty() && self.discarded.is_empty()
    }
    /// Folds the outcome of another call into this one.
    pub fn absorb(&mut self, other: ReconcileOutcome) {
        self.upserted.extend(other.upserted);
        self.discarded.extend(other.discarded);
        self.matches.extend(other.matches);
        self.inserted += other.inserted;
        self.merged += other.merged;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

/// Matches and merges confirmed entries into a [`PartitionLog`].
///
/// The reconciler performs no I/O. Applying the same batch twice leaves the
/// log unchanged the second time.
#[derive(Debug, Clone)]
pub struct Reconciler {
    variants: Vec<FingerprintVariant>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            variants: FingerprintVariant::ALL.to_vec(),
        }
    }
}

impl Reconciler {
    /// Creates a reconciler trying all fingerprint variants in order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts matching to the given variants, tried in the given order.
    #[must_use]
    pub fn with_variants(mut self, variants: impl IntoIterator<Item = FingerprintVariant>) -> Self {
        self.variants = variants.into_iter().collect();
        self
    }

    /// Variants tried when matching.
    #[must_use]
    pub fn variants(&self) -> &[FingerprintVariant] {
        &self.variants
    }

    /// Applies a batch of confirmed entries to `log`.
    pub fn reconcile(
        &self,
        log: &mut PartitionLog,
        batch: &[Entry],
        now_ms: i64,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let mut touched: Vec<EntryId> = Vec::new();
        let mut before: HashMap<EntryId, Option<Entry>> = HashMap::new();

        for incoming in batch {
            if !incoming.id.is_confirmed() {
                tracing::warn!(id = %incoming.id, "skipping non-confirmed entry in confirmed batch");
                outcome.skipped += 1;
                continue;
            }
            if incoming.partition_id != log.partition_id() {
                tracing::warn!(
                    id = %incoming.id,
                    entry_partition = %incoming.partition_id,
                    partition = %log.partition_id(),
                    "skipping entry for another partition"
                );
                outcome.skipped += 1;
                continue;
            }

            if !before.contains_key(&incoming.id) {
                before.insert(incoming.id, log.get(incoming.id).cloned());
                touched.push(incoming.id);
            }

            match log.get(incoming.id) {
                Some(existing) => {
                    let merged = existing.merged(incoming);
                    if merged == *existing {
                        outcome.unchanged += 1;
                    } else {
                        outcome.merged += 1;
                        Self::store(log, merged, &mut outcome);
                    }
                }
                None => {
                    if let Some(record) = self.match_pending(log, incoming, now_ms) {
                        log.remove(record.tentative_id);
                        outcome.discarded.push(record.tentative_id);
                        outcome.matches.push(record);
                    }
                    outcome.inserted += 1;
                    Self::store(log, incoming.clone(), &mut outcome);
                }
            }
        }

        // An id touched several times may end where it started.
        outcome.upserted = touched
            .into_iter()
            .filter_map(|id| {
                let current = log.get(id)?;
                let unchanged = before.get(&id).and_then(Option::as_ref) == Some(current);
                (!unchanged).then(|| current.clone())
            })
            .collect();

        if !batch.is_empty() {
            tracing::debug!(
                partition = %log.partition_id(),
                batch = batch.len(),
                inserted = outcome.inserted,
                merged = outcome.merged,
                unchanged = outcome.unchanged,
                matched = outcome.matches.len(),
                skipped = outcome.skipped,
                "reconciled batch"
            );
        }
        outcome
    }

    fn match_pending(
        &self,
        log: &mut PartitionLog,
        confirmed: &Entry,
        now_ms: i64,
    ) -> Option<MatchRecord> {
        let prints = EntryFingerprints::of(confirmed);
        self.variants.iter().find_map(|&variant| {
            let key = prints.get(variant)?;
            let tentative_id = log.index_mut().consume(variant, &key, now_ms)?;
            tracing::trace!(
                tentative = %tentative_id,
                confirmed = %confirmed.id,
                variant = variant.as_str(),
                "matched pending entry"
            );
            Some(MatchRecord {
                tentative_id,
                confirmed_id: confirmed.id,
                variant,
            })
        })
    }

    fn store(log: &mut PartitionLog, entry: Entry, outcome: &mut ReconcileOutcome) {
        let id = entry.id;
        if let Err(err) = log.upsert(entry) {
            tracing::warn!(id = %id, error = %err, "failed to store reconciled entry");
            outcome.skipped += 1;
        }
    }
}
