//! Index of pending tentative entries, bucketed by fingerprint.

use crate::entry::{Entry, EntryStatus};
use crate::fingerprint::{EntryFingerprints, Fingerprint, FingerprintVariant};
use crate::types::EntryId;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

type Bucket = HashMap<Fingerprint, VecDeque<EntryId>>;

#[derive(Debug, Clone)]
struct Member {
    fingerprints: EntryFingerprints,
    created_at: Option<i64>,
}

/// Pending tentative entries, keyed by each fingerprint variant.
///
/// An entry is eligible while its id is negative, its status is active and
/// it is younger than the TTL. Each key maps to a FIFO list of ids in
/// creation order, so ties resolve to the oldest pending entry.
///
/// # Invariants
///
/// - An id is present in all of its buckets or in none
/// - [`consume`](Self::consume) removes the returned id everywhere, so no
///   tentative entry can be matched twice
/// - Expired ids reaching the front of a list are dropped, never returned
#[derive(Debug, Clone)]
pub struct OptimisticBucketIndex {
    ttl_ms: i64,
    exact: Bucket,
    loose: Bucket,
    media_loose: Bucket,
    members: HashMap<EntryId, Member>,
}

impl OptimisticBucketIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            exact: HashMap::new(),
            loose: HashMap::new(),
            media_loose: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Returns the TTL in milliseconds.
    #[must_use]
    pub const fn ttl_ms(&self) -> i64 {
        self.ttl_ms
    }

    /// Returns true if `entry` may be matched at `now_ms`.
    ///
    /// An entry without a creation time never expires.
    #[must_use]
    pub fn is_eligible(&self, entry: &Entry, now_ms: i64) -> bool {
        entry.id.is_tentative()
            && entry.status() == EntryStatus::Active
            && !self.is_expired(entry.created_at, now_ms)
    }

    fn is_expired(&self, created_at: Option<i64>, now_ms: i64) -> bool {
        created_at.is_some_and(|created| now_ms.saturating_sub(created) >= self.ttl_ms)
    }

    /// Adds an entry if it is eligible and not already indexed.
    ///
    /// Returns true if the entry was added.
    pub fn insert(&mut self, entry: &Entry, now_ms: i64) -> bool {
        if !self.is_eligible(entry, now_ms) || self.members.contains_key(&entry.id) {
            return false;
        }

        let fingerprints = EntryFingerprints::of(entry);
        for variant in FingerprintVariant::ALL {
            if let Some(key) = fingerprints.get(variant) {
                self.bucket_mut(variant)
                    .entry(key)
                    .or_default()
                    .push_back(entry.id);
            }
        }
        self.members.insert(
            entry.id,
            Member {
                fingerprints,
                created_at: entry.created_at,
            },
        );
        true
    }

    /// Removes an id from every bucket. Returns true if it was indexed.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(member) = self.members.remove(&id) else {
            return false;
        };

        for variant in FingerprintVariant::ALL {
            if let Some(key) = member.fingerprints.get(variant) {
                let bucket = self.bucket_mut(variant);
                if let Some(list) = bucket.get_mut(&key) {
                    list.retain(|candidate| *candidate != id);
                    if list.is_empty() {
                        bucket.remove(&key);
                    }
                }
            }
        }
        true
    }

    /// Pops the oldest eligible id under `key`, removing it from the index.
    pub fn consume(
        &mut self,
        variant: FingerprintVariant,
        key: &Fingerprint,
        now_ms: i64,
    ) -> Option<EntryId> {
        loop {
            let front = *self.bucket_mut(variant).get(key)?.front()?;
            let expired = self
                .members
                .get(&front)
                .map_or(true, |m| self.is_expired(m.created_at, now_ms));

            if expired {
                tracing::trace!(id = %front, "dropping expired tentative entry from index");
                if !self.remove(front) {
                    self.drop_stray(variant, key, front);
                }
                continue;
            }

            self.remove(front);
            return Some(front);
        }
    }

    /// Removes a list head that has no member record.
    fn drop_stray(&mut self, variant: FingerprintVariant, key: &Fingerprint, id: EntryId) {
        let bucket = self.bucket_mut(variant);
        if let Some(list) = bucket.get_mut(key) {
            list.retain(|candidate| *candidate != id);
            if list.is_empty() {
                bucket.remove(key);
            }
        }
    }

    /// Clears the index and refills it from `entries`.
    ///
    /// Eligible entries are inserted oldest first: by creation time, then by
    /// allocation order (ids closer to zero were allocated earlier).
    pub fn rebuild<'a, I>(&mut self, entries: I, now_ms: i64)
    where
        I: IntoIterator<Item = &'a Entry>,
    {
        self.exact.clear();
        self.loose.clear();
        self.media_loose.clear();
        self.members.clear();

        let mut eligible: Vec<&Entry> = entries
            .into_iter()
            .filter(|e| self.is_eligible(e, now_ms))
            .collect();
        eligible.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        for entry in eligible {
            self.insert(entry, now_ms);
        }
    }

    /// Returns true if the id is indexed.
    #[must_use]
    pub fn contains(&self, id: EntryId) -> bool {
        self.members.contains_key(&id)
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn bucket_mut(&mut self, variant: FingerprintVariant) -> &mut Bucket {
        match variant {
            FingerprintVariant::Exact => &mut self.exact,
            FingerprintVariant::Loose => &mut self.loose,
            FingerprintVariant::MediaLoose => &mut self.media_loose,
        }
    }
}
