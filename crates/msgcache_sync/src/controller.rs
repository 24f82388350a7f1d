//! The partition sync controller.
//!
//! The controller owns the in-memory projection of the active partition and
//! is its single writer. Every mutation takes the partition lock, changes the
//! [`PartitionLog`], publishes a fresh immutable snapshot and then hands the
//! changed entries to the durable store. Readers only ever see whole
//! snapshots.
//!
//! ## Lifecycle
//!
//! ```text
//! Unloaded --activate--> Loading --hydrated--> HydratedStale --fetched--> Synced
//!                           ^                                               |
//!                           +---------------- activate (new generation) ----+
//! ```
//!
//! Every activation mints a new generation. A fetch remembers the generation
//! it started under, and pages arriving under a newer generation are dropped
//! without being applied. Activation hydrates under the partition lock, so
//! pushes and submit responses never see a half-loaded log.
//!
//! Confirmed entries for a partition other than the active one are
//! reconciled against its stored entries and written through, so a submit
//! that finishes after a switch is not lost.
//!
//! The fetch watermark is stored with each page. Pushed entries can carry
//! sequences beyond it, so the next activation resumes from the watermark
//! instead of the highest stored sequence.
//!
//! ## Failure handling
//!
//! Durable-store and network failures are published on the error channel
//! ([`SyncController::last_error`], [`SyncController::subscribe_errors`]).
//! They never roll back in-memory state.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::push::{PushFeed, PushPoll};
use crate::remote::RemoteSource;
use crate::state::{
    ErrorContext, ErrorReport, FetchOutcome, PartitionPhase, ResyncTrigger, SyncStats,
};
use msgcache_core::{
    position_between, Clock, Entry, EntryId, PartitionId, PartitionLog,
    ReconcileOutcome, Reconciler, SystemClock,
};
use msgcache_store::{DurableStore, WriteBatch};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the push listener checks for shutdown while idle.
const PUSH_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ActivePartition {
    partition: PartitionId,
    generation: u64,
    phase: PartitionPhase,
    log: PartitionLog,
    cursor: Option<u64>,
    stored_cursor: Option<u64>,
    snapshot: Arc<[Entry]>,
}

impl ActivePartition {
    fn loading(partition: PartitionId, generation: u64, pending_ttl: Duration) -> Self {
        Self {
            partition,
            generation,
            phase: PartitionPhase::Loading,
            log: PartitionLog::new(partition, pending_ttl),
            cursor: None,
            stored_cursor: None,
            snapshot: Arc::from(Vec::new()),
        }
    }

    fn publish(&mut self) {
        self.snapshot = self.log.snapshot();
    }

    /// Adds the in-memory cursor to `batch` unless the store already has it.
    fn stamp_cursor(&self, batch: WriteBatch) -> WriteBatch {
        let cursor = self.cursor.unwrap_or(0);
        if self.stored_cursor == Some(cursor) {
            batch
        } else {
            batch.with_sync_cursor(self.partition, cursor)
        }
    }
}

/// Handle to a tentative entry whose submit runs in the background.
#[derive(Debug)]
pub struct OptimisticWrite {
    local_id: EntryId,
    handle: JoinHandle<SyncResult<Entry>>,
}

impl OptimisticWrite {
    /// The tentative id, visible in the projection right away.
    pub fn local_id(&self) -> EntryId {
        self.local_id
    }

    /// Returns true once the submit has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the submit and returns the confirmed entry.
    pub fn wait(self) -> SyncResult<Entry> {
        self.handle.join().unwrap_or(Err(SyncError::Cancelled))
    }
}

/// Keeps one partition's projection in step with the remote source.
///
/// See the [module documentation](self) for the lifecycle.
pub struct SyncController<R: RemoteSource, S: DurableStore> {
    config: SyncConfig,
    remote: Arc<R>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    reconciler: Reconciler,
    active: Mutex<Option<ActivePartition>>,
    generation: AtomicU64,
    next_local_id: AtomicI64,
    shutdown: AtomicBool,
    stats: RwLock<SyncStats>,
    last_error: RwLock<Option<ErrorReport>>,
    error_subscribers: Mutex<Vec<Sender<ErrorReport>>>,
}

impl<R: RemoteSource + 'static, S: DurableStore + 'static> SyncController<R, S> {
    /// Creates a controller with no active partition.
    pub fn new(config: SyncConfig, remote: Arc<R>, store: Arc<S>) -> Self {
        Self {
            config,
            remote,
            store,
            clock: Arc::new(SystemClock),
            reconciler: Reconciler::new(),
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            next_local_id: AtomicI64::new(-1),
            shutdown: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
            last_error: RwLock::new(None),
            error_subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the reconciler, e.g. to restrict fingerprint variants.
    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Switches to `partition`: hydrate from the store, publish, then fetch
    /// everything after the stored cursor.
    ///
    /// Any fetch still running for the previous activation is invalidated.
    ///
    /// # Errors
    ///
    /// Fails if the fetch fails or the controller is shut down. Local entries
    /// are published even when the fetch fails.
    pub fn activate(&self, partition: PartitionId) -> SyncResult<FetchOutcome> {
        let generation = {
            let mut guard = self.active.lock();
            self.check_running()?;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.stats.write().activations += 1;
            tracing::info!(%partition, generation, "activating partition");

            let active = guard.insert(ActivePartition::loading(
                partition,
                generation,
                self.config.pending_ttl,
            ));
            self.hydrate(active);
            generation
        };
        self.fetch_from_cursor(generation)
    }

    fn hydrate(&self, active: &mut ActivePartition) {
        let partition = active.partition;
        let (stored, stored_cursor) = self.load_stored(partition).unwrap_or_default();
        if let Some(lowest) = stored.iter().map(|e| e.id.as_i64()).filter(|id| *id < 0).min() {
            self.next_local_id
                .fetch_min(lowest.saturating_sub(1), Ordering::SeqCst);
        }

        let now = self.clock.now_ms();
        active.log = PartitionLog::hydrate(partition, stored, self.config.pending_ttl, now);
        active.cursor = match stored_cursor {
            Some(cursor) => Some(cursor).filter(|c| *c > 0),
            None => active.log.max_sequence(),
        };
        active.stored_cursor = stored_cursor;
        active.phase = PartitionPhase::HydratedStale;
        active.publish();
        tracing::info!(
            %partition,
            entries = active.log.len(),
            cursor = ?active.cursor,
            "partition hydrated"
        );
    }

    /// Reads a partition's stored entries and cursor.
    fn load_stored(&self, partition: PartitionId) -> Option<(Vec<Entry>, Option<u64>)> {
        let loaded = self
            .store
            .query_by_partition(partition)
            .and_then(|entries| {
                self.store
                    .sync_cursor(partition)
                    .map(|cursor| (entries, cursor))
            });
        match loaded {
            Ok(loaded) => Some(loaded),
            Err(err) => {
                self.report(Some(partition), ErrorContext::Hydrate, err.into());
                None
            }
        }
    }

    /// Runs an incremental fetch for the active partition.
    ///
    /// Foreground, reconnect and manual triggers all take the same path:
    /// fetch pages after the current cursor, never a full reload.
    ///
    /// # Errors
    ///
    /// Fails if the fetch fails or the controller is shut down.
    pub fn trigger(&self, trigger: ResyncTrigger) -> SyncResult<FetchOutcome> {
        self.check_running()?;
        let generation = match self.active.lock().as_ref() {
            Some(active) => active.generation,
            None => return Ok(FetchOutcome::Skipped),
        };
        self.stats.write().resyncs += 1;
        tracing::info!(trigger = trigger.as_str(), generation, "resync requested");
        self.fetch_from_cursor(generation)
    }

    /// Manual resync of the active partition.
    ///
    /// # Errors
    ///
    /// See [`trigger`](Self::trigger).
    pub fn refresh(&self) -> SyncResult<FetchOutcome> {
        self.trigger(ResyncTrigger::Manual)
    }

    fn fetch_from_cursor(&self, generation: u64) -> SyncResult<FetchOutcome> {
        let (partition, mut cursor) = match self.active.lock().as_ref() {
            Some(active) if active.generation == generation => (active.partition, active.cursor),
            Some(active) => {
                let partition = active.partition;
                return Ok(self.discard(partition, generation));
            }
            None => return Ok(FetchOutcome::Skipped),
        };

        let mut pages = 0u32;
        let mut received = 0usize;
        let mut complete = false;

        while !complete {
            self.check_running()?;
            if self
                .config
                .max_pages_per_sync
                .is_some_and(|max| pages >= max)
            {
                break;
            }

            let page = match self
                .remote
                .fetch_page(partition, cursor, self.config.page_size)
            {
                Ok(page) => page,
                Err(err) => {
                    self.report(Some(partition), ErrorContext::Fetch, err.clone());
                    return Err(err);
                }
            };

            let now = self.clock.now_ms();
            let mut guard = self.active.lock();
            let Some(active) = guard.as_mut().filter(|a| a.generation == generation) else {
                return Ok(self.discard(partition, generation));
            };

            let outcome = self
                .reconciler
                .reconcile(&mut active.log, &page.entries, now);
            let page_max = page.entries.iter().filter_map(|e| e.sequence).max();
            let next = [cursor, page.next_cursor, page_max].into_iter().flatten().max();
            let advanced = next > cursor;
            cursor = next;
            active.cursor = active.cursor.max(cursor);
            if !outcome.is_noop() {
                active.publish();
            }
            let batch = active.stamp_cursor(self.outcome_batch(&outcome));
            self.write_active(active, batch);
            drop(guard);

            pages += 1;
            received += page.entries.len();
            self.record_reconcile(&outcome, page.entries.len());
            self.stats.write().pages_fetched += 1;
            tracing::debug!(
                %partition,
                page = pages,
                entries = page.entries.len(),
                cursor = ?cursor,
                "applied page"
            );

            complete = page.is_last;
            if !complete && !advanced {
                tracing::warn!(%partition, cursor = ?cursor, "page did not advance the cursor");
                break;
            }
        }

        let mut guard = self.active.lock();
        match guard.as_mut() {
            Some(active) if active.generation == generation => {
                if complete && active.phase != PartitionPhase::Synced {
                    active.phase = PartitionPhase::Synced;
                    tracing::info!(%partition, cursor = ?active.cursor, "partition synced");
                }
            }
            _ => return Ok(self.discard(partition, generation)),
        }

        Ok(FetchOutcome::Applied {
            pages,
            entries: received,
            cursor,
        })
    }

    /// Appends a draft to the active partition and submits it in the
    /// background.
    ///
    /// The draft gets a fresh negative id, a creation time if it has none and
    /// a position after the last entry if it has none. It is visible in
    /// [`get_entries`](Self::get_entries) before this returns. The remote's
    /// response goes through the same path as pushed entries; a failed submit
    /// marks the entry [`Failed`](msgcache_core::EntryStatus::Failed).
    ///
    /// # Errors
    ///
    /// Fails if the draft's partition is not active.
    pub fn append_optimistic(self: &Arc<Self>, draft: Entry) -> SyncResult<OptimisticWrite> {
        let tentative = self.append_tentative(draft)?;
        let local_id = tentative.id;
        let this = Arc::clone(self);
        let handle = thread::spawn(move || this.submit(tentative));
        Ok(OptimisticWrite { local_id, handle })
    }

    /// Like [`append_optimistic`](Self::append_optimistic) but submits on
    /// the calling thread.
    ///
    /// # Errors
    ///
    /// Fails if the draft's partition is not active or the submit fails. A
    /// failed submit leaves the entry marked failed.
    pub fn append_blocking(&self, draft: Entry) -> SyncResult<Entry> {
        let tentative = self.append_tentative(draft)?;
        self.submit(tentative)
    }

    fn append_tentative(&self, mut draft: Entry) -> SyncResult<Entry> {
        self.check_running()?;
        let partition = draft.partition_id;
        let now = self.clock.now_ms();

        let mut guard = self.active.lock();
        let active = guard
            .as_mut()
            .filter(|a| a.partition == partition)
            .ok_or_else(|| SyncError::InvalidDraft(format!("{partition} is not active")))?;

        draft.id = EntryId::new(self.next_local_id.fetch_sub(1, Ordering::SeqCst));
        draft.sequence = None;
        draft.status = None;
        draft.created_at.get_or_insert(now);
        if draft.position.is_none() {
            draft.position = Some(position_between(active.log.last_position(), None));
        }

        active.log.insert_tentative(draft.clone(), now)?;
        active.publish();
        if self.config.persist_tentative {
            self.write_active(active, WriteBatch::new().upsert(draft.clone()));
        }
        tracing::debug!(id = %draft.id, %partition, "appended tentative entry");
        Ok(draft)
    }

    fn submit(&self, tentative: Entry) -> SyncResult<Entry> {
        self.stats.write().submits += 1;
        match self.remote.submit_entry(&tentative) {
            Ok(confirmed) => {
                self.apply_confirmed(std::slice::from_ref(&confirmed));
                Ok(confirmed)
            }
            Err(err) => {
                self.fail_tentative(&tentative, &err);
                Err(err)
            }
        }
    }

    fn fail_tentative(&self, tentative: &Entry, err: &SyncError) {
        self.stats.write().submit_failures += 1;
        let partition = tentative.partition_id;
        let now = self.clock.now_ms();

        {
            let mut guard = self.active.lock();
            if self.is_shut_down() {
                tracing::debug!(id = %tentative.id, "ignoring submit failure after shutdown");
                return;
            }
            // Failed entries are written even when tentative ones are not, so
            // they survive a restart until retried or removed.
            match guard.as_mut().filter(|a| a.partition == partition) {
                Some(active) => match active.log.mark_failed(tentative.id, now) {
                    Ok(failed) => {
                        active.publish();
                        self.write_active(active, WriteBatch::new().upsert(failed));
                    }
                    Err(resolved) => {
                        tracing::debug!(id = %tentative.id, error = %resolved, "tentative entry already resolved");
                    }
                },
                None => self.fail_stored(tentative, now),
            }
        }

        self.report(Some(partition), ErrorContext::Submit, err.clone());
    }

    fn fail_stored(&self, tentative: &Entry, now: i64) {
        let partition = tentative.partition_id;
        let Some((stored, _)) = self.load_stored(partition) else {
            return;
        };
        let mut log = PartitionLog::hydrate(partition, stored, self.config.pending_ttl, now);
        if !self.config.persist_tentative && !log.contains(tentative.id) {
            if let Err(err) = log.insert_tentative(tentative.clone(), now) {
                tracing::debug!(id = %tentative.id, error = %err, "cannot restore tentative entry");
                return;
            }
        }
        match log.mark_failed(tentative.id, now) {
            Ok(failed) => {
                self.write_batch(partition, &WriteBatch::new().upsert(failed));
            }
            Err(resolved) => {
                tracing::debug!(id = %tentative.id, error = %resolved, "stored tentative entry already resolved");
            }
        }
    }

    /// Reconciles confirmed entries delivered by the push channel.
    ///
    /// Entries for the active partition update the projection. Entries for
    /// other partitions are reconciled against their stored entries and
    /// written through. Returns `None` if nothing was applied.
    pub fn apply_push(&self, batch: &[Entry]) -> Option<ReconcileOutcome> {
        let outcome = self.apply_confirmed(batch)?;
        self.stats.write().pushes_applied += 1;
        Some(outcome)
    }

    fn apply_confirmed(&self, batch: &[Entry]) -> Option<ReconcileOutcome> {
        if batch.is_empty() {
            return None;
        }
        let now = self.clock.now_ms();
        let mut guard = self.active.lock();
        if self.is_shut_down() {
            tracing::debug!(entries = batch.len(), "ignoring confirmed entries after shutdown");
            return None;
        }

        let mut by_partition: BTreeMap<PartitionId, Vec<Entry>> = BTreeMap::new();
        for entry in batch {
            by_partition
                .entry(entry.partition_id)
                .or_default()
                .push(entry.clone());
        }

        let mut total: Option<ReconcileOutcome> = None;
        for (partition, entries) in by_partition {
            let outcome = match guard.as_mut().filter(|a| a.partition == partition) {
                Some(active) => {
                    let outcome = self.reconciler.reconcile(&mut active.log, &entries, now);
                    if !outcome.is_noop() {
                        active.publish();
                    }
                    let batch = self.outcome_batch(&outcome);
                    self.write_active(active, batch);
                    outcome
                }
                None => match self.reconcile_stored(partition, &entries, now) {
                    Some(outcome) => outcome,
                    None => continue,
                },
            };

            self.record_reconcile(&outcome, entries.len());
            total = Some(match total.take() {
                Some(mut total) => {
                    total.absorb(outcome);
                    total
                }
                None => outcome,
            });
        }
        total
    }

    /// Reconciles confirmed entries into a partition that is not loaded.
    fn reconcile_stored(
        &self,
        partition: PartitionId,
        entries: &[Entry],
        now: i64,
    ) -> Option<ReconcileOutcome> {
        let (stored, stored_cursor) = self.load_stored(partition)?;
        let mut log = PartitionLog::hydrate(partition, stored, self.config.pending_ttl, now);
        let fetched = log.max_sequence().unwrap_or(0);

        let outcome = self.reconciler.reconcile(&mut log, entries, now);
        let mut batch = self.outcome_batch(&outcome);
        if !batch.is_empty() && stored_cursor.is_none() {
            // Pin the cursor below the new entries so the gap is still fetched.
            batch = batch.with_sync_cursor(partition, fetched);
        }
        self.write_batch(partition, &batch);
        tracing::debug!(
            %partition,
            entries = entries.len(),
            upserted = outcome.upserted.len(),
            "wrote confirmed entries for inactive partition"
        );
        Some(outcome)
    }

    /// Applies push batches from `feed` on a background thread until the
    /// feed closes or the controller shuts down.
    pub fn spawn_push_listener(self: &Arc<Self>, feed: PushFeed) -> JoinHandle<()> {
        let this = Arc::clone(self);
        thread::spawn(move || {
            while !this.is_shut_down() {
                match feed.poll(PUSH_POLL_INTERVAL) {
                    PushPoll::Batch(batch) => {
                        this.apply_push(&batch);
                    }
                    PushPoll::Idle => {}
                    PushPoll::Closed => break,
                }
            }
            tracing::debug!("push listener stopped");
        })
    }

    /// Removes an entry from the active partition and the store.
    ///
    /// # Errors
    ///
    /// Fails if the entry is not in the active partition or the controller
    /// is shut down.
    pub fn remove_entry(&self, id: EntryId) -> SyncResult<()> {
        self.check_running()?;
        let mut guard = self.active.lock();
        let active = guard.as_mut().ok_or(SyncError::EntryNotFound { id })?;
        active
            .log
            .remove(id)
            .ok_or(SyncError::EntryNotFound { id })?;
        active.publish();

        let partition = active.partition;
        self.write_active(active, WriteBatch::new().delete(id));
        tracing::debug!(%id, %partition, "removed entry");
        Ok(())
    }

    /// Replaces `from_id` with `entry`, e.g. to undo an edit.
    ///
    /// A tentative replacement is indexed for matching like a new draft.
    ///
    /// # Errors
    ///
    /// Fails if `from_id` is not in the active partition, `entry` belongs
    /// to another partition or the controller is shut down.
    pub fn replace_entry(&self, from_id: EntryId, entry: Entry) -> SyncResult<()> {
        self.check_running()?;
        let now = self.clock.now_ms();
        let mut guard = self.active.lock();
        let active = guard
            .as_mut()
            .ok_or(SyncError::EntryNotFound { id: from_id })?;
        if !active.log.contains(from_id) {
            return Err(SyncError::EntryNotFound { id: from_id });
        }
        if entry.partition_id != active.partition {
            return Err(SyncError::InvalidDraft(format!(
                "replacement belongs to {}, active partition is {}",
                entry.partition_id, active.partition
            )));
        }
        if entry.id != from_id && active.log.contains(entry.id) {
            return Err(SyncError::InvalidDraft(format!(
                "{} is already present",
                entry.id
            )));
        }

        let previous = active.log.remove(from_id);
        let inserted = if entry.is_tentative() {
            active.log.insert_tentative(entry.clone(), now)
        } else {
            active.log.upsert(entry.clone()).map(|_| ())
        };
        if let Err(err) = inserted {
            if let Some(previous) = previous {
                if previous.is_tentative() {
                    active.log.insert_tentative(previous, now)?;
                } else {
                    active.log.upsert(previous)?;
                }
            }
            return Err(err.into());
        }
        active.publish();

        let partition = active.partition;
        let mut batch = WriteBatch::new();
        if entry.id.is_confirmed() || self.config.persist_tentative {
            batch = batch.upsert(entry.clone());
        }
        if entry.id != from_id {
            batch = batch.delete(from_id);
        }
        self.write_active(active, batch);
        tracing::debug!(from = %from_id, to = %entry.id, %partition, "replaced entry");
        Ok(())
    }

    /// Visible entries of `partition`, sorted by `(position, id)`.
    ///
    /// Served from memory and never blocks on the network. Empty unless
    /// `partition` is active.
    pub fn get_entries(&self, partition: PartitionId) -> Arc<[Entry]> {
        match self.active.lock().as_ref() {
            Some(active) if active.partition == partition => Arc::clone(&active.snapshot),
            _ => Arc::from(Vec::new()),
        }
    }

    /// Phase of `partition`.
    pub fn phase(&self, partition: PartitionId) -> PartitionPhase {
        match self.active.lock().as_ref() {
            Some(active) if active.partition == partition => active.phase,
            _ => PartitionPhase::Unloaded,
        }
    }

    /// The active partition.
    pub fn active_partition(&self) -> Option<PartitionId> {
        self.active.lock().as_ref().map(|a| a.partition)
    }

    /// Fetch cursor of `partition`, `None` before anything was fetched or if
    /// the partition is not active.
    pub fn cursor(&self, partition: PartitionId) -> Option<u64> {
        match self.active.lock().as_ref() {
            Some(active) if active.partition == partition => active.cursor,
            _ => None,
        }
    }

    /// Current generation token.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Counters since creation.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The most recent error report.
    pub fn last_error(&self) -> Option<ErrorReport> {
        self.last_error.read().clone()
    }

    /// Subscribes to future error reports.
    pub fn subscribe_errors(&self) -> Receiver<ErrorReport> {
        let (tx, rx) = mpsc::channel();
        self.error_subscribers.lock().push(tx);
        rx
    }

    /// Stops the controller. In-flight fetches are discarded and further
    /// operations fail with [`SyncError::Cancelled`].
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(active) = self.active.lock().as_mut() {
            active.phase = PartitionPhase::Unloaded;
            active.generation = 0;
        }
        tracing::info!("sync controller shut down");
    }

    /// Returns true after [`shutdown`](Self::shutdown).
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn check_running(&self) -> SyncResult<()> {
        if self.is_shut_down() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn discard(&self, partition: PartitionId, generation: u64) -> FetchOutcome {
        self.stats.write().discarded_fetches += 1;
        tracing::warn!(%partition, generation, "discarding stale fetch");
        FetchOutcome::Discarded
    }

    fn outcome_batch(&self, outcome: &ReconcileOutcome) -> WriteBatch {
        let persist_tentative = self.config.persist_tentative;
        WriteBatch {
            upserts: outcome
                .upserted
                .iter()
                .filter(|e| persist_tentative || e.id.is_confirmed())
                .cloned()
                .collect(),
            deletes: outcome.discarded.clone(),
            sync_cursor: None,
        }
    }

    fn write_active(&self, active: &mut ActivePartition, batch: WriteBatch) {
        if batch.is_empty() {
            return;
        }
        let batch = active.stamp_cursor(batch);
        if self.write_batch(active.partition, &batch) {
            if let Some((_, cursor)) = batch.sync_cursor {
                active.stored_cursor = Some(cursor);
            }
        }
    }

    fn write_batch(&self, partition: PartitionId, batch: &WriteBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        match self.store.apply(batch) {
            Ok(()) => true,
            Err(err) => {
                self.stats.write().persistence_failures += 1;
                self.report(Some(partition), ErrorContext::Persist, err.into());
                false
            }
        }
    }

    fn record_reconcile(&self, outcome: &ReconcileOutcome, entries: usize) {
        let mut stats = self.stats.write();
        stats.entries_reconciled += entries as u64;
        stats.matches += outcome.matches.len() as u64;
    }

    fn report(&self, partition: Option<PartitionId>, context: ErrorContext, error: SyncError) {
        tracing::warn!(partition = ?partition, %context, error = %error, "sync error");
        let report = ErrorReport {
            partition,
            context,
            error,
        };
        self.error_subscribers
            .lock()
            .retain(|tx| tx.send(report.clone()).is_ok());
        *self.last_error.write() = Some(report);
    }
}

impl<R: RemoteSource, S: DurableStore> std::fmt::Debug for SyncController<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let active = self.active.lock();
        f.debug_struct("SyncController")
            .field("partition", &active.as_ref().map(|a| a.partition))
            .field("phase", &active.as_ref().map(|a| a.phase))
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .finish()
    }
}
