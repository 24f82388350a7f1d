//! Controller behaviour against mock remotes and real stores.

use msgcache_core::{Clock, ManualClock};
use msgcache_store::{DurableStore, LogStore, LogStoreConfig, MemoryStore, StoreResult, WriteBatch};
use msgcache_sync::{
    push_channel, ErrorContext, FetchOutcome, FetchPage, MockRemote, PartitionPhase,
    RemoteSource, ResyncTrigger, SyncConfig, SyncController, SyncError, SyncResult,
};
use msgcache_testkit::prelude::*;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

const P: PartitionId = PartitionId(7);
const Q: PartitionId = PartitionId(8);
const START: i64 = 1_700_000_000_000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Controller<S> = Arc<SyncController<MockRemote, S>>;

fn setup_with(
    config: SyncConfig,
    store: MemoryStore,
) -> (Controller<MemoryStore>, Arc<MockRemote>, Arc<MemoryStore>, Arc<ManualClock>) {
    init_tracing();
    let remote = Arc::new(MockRemote::new());
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(START));
    let controller = SyncController::new(config, remote.clone(), store.clone())
        .with_clock(clock.clone());
    (Arc::new(controller), remote, store, clock)
}

fn setup() -> (Controller<MemoryStore>, Arc<MockRemote>, Arc<MemoryStore>, Arc<ManualClock>) {
    setup_with(SyncConfig::default(), MemoryStore::new())
}

fn ids(entries: &[Entry]) -> Vec<i64> {
    entries.iter().map(|e| e.id.as_i64()).collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Holds callers of [`Gate::pass`] until the gate is opened.
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

#[derive(Default)]
struct GateState {
    waiting: usize,
    open: bool,
}

impl Gate {
    fn pass(&self) {
        let mut state = self.state.lock();
        state.waiting += 1;
        self.changed.notify_all();
        while !state.open {
            self.changed.wait(&mut state);
        }
        state.waiting -= 1;
    }

    fn wait_for_caller(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut state = self.state.lock();
        while state.waiting == 0 {
            let timeout = self.changed.wait_until(&mut state, deadline);
            assert!(!timeout.timed_out(), "nobody reached the gate");
        }
    }

    fn open(&self) {
        self.state.lock().open = true;
        self.changed.notify_all();
    }
}

/// A store whose partition reads wait at a gate.
#[derive(Default)]
struct GatedStore {
    inner: MemoryStore,
    reads: Gate,
}

impl DurableStore for GatedStore {
    fn batch_upsert(&self, entries: &[Entry]) -> StoreResult<()> {
        self.inner.batch_upsert(entries)
    }

    fn batch_delete(&self, ids: &[EntryId]) -> StoreResult<()> {
        self.inner.batch_delete(ids)
    }

    fn query_by_partition(&self, partition: PartitionId) -> StoreResult<Vec<Entry>> {
        self.reads.pass();
        self.inner.query_by_partition(partition)
    }

    fn clear_partition(&self, partition: PartitionId) -> StoreResult<()> {
        self.inner.clear_partition(partition)
    }

    fn sync_cursor(&self, partition: PartitionId) -> StoreResult<Option<u64>> {
        self.inner.sync_cursor(partition)
    }

    fn set_sync_cursor(&self, partition: PartitionId, cursor: u64) -> StoreResult<()> {
        self.inner.set_sync_cursor(partition, cursor)
    }

    fn apply(&self, batch: &WriteBatch) -> StoreResult<()> {
        self.inner.apply(batch)
    }
}

/// A mock remote whose submits wait at a gate.
#[derive(Default)]
struct GatedSubmitRemote {
    inner: MockRemote,
    submits: Gate,
}

impl RemoteSource for GatedSubmitRemote {
    fn fetch_page(
        &self,
        partition: PartitionId,
        after_sequence: Option<u64>,
        page_size: u32,
    ) -> SyncResult<FetchPage> {
        self.inner.fetch_page(partition, after_sequence, page_size)
    }

    fn submit_entry(&self, draft: &Entry) -> SyncResult<Entry> {
        self.submits.pass();
        self.inner.submit_entry(draft)
    }
}

type GatedController = Arc<SyncController<GatedSubmitRemote, MemoryStore>>;

fn gated_setup(config: SyncConfig) -> (GatedController, Arc<GatedSubmitRemote>, Arc<MemoryStore>) {
    init_tracing();
    let remote = Arc::new(GatedSubmitRemote::default());
    let store = Arc::new(MemoryStore::new());
    let controller = SyncController::new(config, remote.clone(), store.clone())
        .with_clock(Arc::new(ManualClock::new(START)));
    (Arc::new(controller), remote, store)
}

/// A remote that serves queued pages verbatim.
#[derive(Default)]
struct ScriptedRemote {
    pages: Mutex<Vec<FetchPage>>,
}

impl ScriptedRemote {
    fn with_pages(pages: Vec<FetchPage>) -> Self {
        Self {
            pages: Mutex::new(pages),
        }
    }
}

impl RemoteSource for ScriptedRemote {
    fn fetch_page(&self, _: PartitionId, _: Option<u64>, _: u32) -> SyncResult<FetchPage> {
        let mut pages = self.pages.lock();
        if pages.is_empty() {
            Ok(FetchPage {
                is_last: true,
                ..FetchPage::default()
            })
        } else {
            Ok(pages.remove(0))
        }
    }

    fn submit_entry(&self, _: &Entry) -> SyncResult<Entry> {
        Err(SyncError::Remote("read-only".into()))
    }
}

#[test]
fn echo_replaces_persisted_tentative() {
    let tentative = text_entry(-1, P, "hi")
        .with_position(10.0)
        .with_created_at(START);
    let (controller, _, store, _) = setup_with(
        SyncConfig::default(),
        MemoryStore::with_entries([tentative.clone()]),
    );
    controller.activate(P).unwrap();
    assert_eq!(ids(&controller.get_entries(P)), vec![-1]);

    let echo = confirm(&tentative, 501, 900);
    let outcome = controller.apply_push(&[echo]).unwrap();

    let entries = controller.get_entries(P);
    assert_eq!(ids(&entries), vec![501]);
    assert_eq!(entries[0].content.as_deref(), Some("hi"));
    assert_eq!(outcome.discarded, vec![EntryId::new(-1)]);
    assert!(store.get(EntryId::new(501)).is_some());
}

#[test]
fn rapid_image_appends_confirm_in_order() {
    let url = "https://cdn/u/photo.jpg";
    let a = image_entry(-1, P, "a", url)
        .with_position(1.0)
        .with_created_at(START);
    let b = image_entry(-2, P, "b", url)
        .with_position(2.0)
        .with_created_at(START + 1);
    let (controller, _, _, _) = setup_with(
        SyncConfig::default(),
        MemoryStore::with_entries([a.clone(), b.clone()]),
    );
    controller.activate(P).unwrap();

    let first = confirm(&a, 601, 1).with_position(30.0);
    let second = confirm(&b, 602, 2).with_position(31.0);
    controller.apply_push(&[first]);
    controller.apply_push(&[second]);

    let entries = controller.get_entries(P);
    assert_eq!(ids(&entries), vec![601, 602]);
    assert_eq!(entries[0].content.as_deref(), Some("a"));
    assert_eq!(entries[1].content.as_deref(), Some("b"));
}

#[test]
fn refetched_annotations_update_in_place() {
    init_tracing();
    let stored = text_entry(40, P, "deploy done")
        .with_sequence(12)
        .with_position(12.0)
        .with_annotations(["ops"]);
    let mut refetched = stored.clone();
    refetched.annotations = Some(["ops".to_string(), "resolved".to_string()].into());

    let remote = Arc::new(ScriptedRemote::with_pages(vec![FetchPage {
        entries: vec![refetched],
        next_cursor: Some(12),
        is_last: true,
    }]));
    let store = Arc::new(MemoryStore::with_entries([stored.clone()]));
    let controller = SyncController::new(SyncConfig::default(), remote, store.clone());

    controller.activate(P).unwrap();

    let entries = controller.get_entries(P);
    assert_eq!(entries.len(), 1);
    let updated = &entries[0];
    assert!(updated.annotations.as_ref().unwrap().contains("resolved"));
    assert_eq!(updated.content, stored.content);
    assert_eq!(updated.sequence, stored.sequence);
    assert_eq!(updated.position, stored.position);
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(EntryId::new(40)).unwrap().annotations, updated.annotations);
}

#[test]
fn expired_tentative_is_orphaned() {
    let tentative = text_entry(-1, P, "late")
        .with_position(5.0)
        .with_created_at(START);
    let (controller, _, _, clock) = setup_with(
        SyncConfig::default(),
        MemoryStore::with_entries([tentative.clone()]),
    );
    clock.advance(Duration::from_secs(11 * 60));
    controller.activate(P).unwrap();

    let outcome = controller
        .apply_push(&[confirm(&tentative, 700, 1)])
        .unwrap();

    assert!(outcome.matches.is_empty());
    assert_eq!(ids(&controller.get_entries(P)), vec![-1, 700]);
}

#[test]
fn own_write_delivered_twice_appears_once() {
    let (controller, remote, store, _) = setup();
    let (tx, feed) = push_channel();
    remote.set_echo(tx);
    controller.activate(P).unwrap();

    let confirmed = controller.append_blocking(text_entry(0, P, "hello")).unwrap();
    for batch in feed.drain() {
        let outcome = controller.apply_push(&batch).unwrap();
        assert!(outcome.is_noop());
    }

    let entries = controller.get_entries(P);
    assert_eq!(ids(&entries), vec![confirmed.id.as_i64()]);
    assert_eq!(store.len(), 1);
    assert_eq!(controller.stats().matches, 1);
}

#[test]
fn optimistic_append_is_visible_before_confirmation() {
    let (controller, remote, _, _) = setup();
    controller.activate(P).unwrap();

    let write = controller
        .append_optimistic(text_entry(0, P, "draft"))
        .unwrap();
    let local = write.local_id();
    assert!(local.is_tentative());

    let confirmed = write.wait().unwrap();
    let entries = controller.get_entries(P);
    assert_eq!(ids(&entries), vec![confirmed.id.as_i64()]);
    assert_eq!(remote.submitted().len(), 1);
}

#[test]
fn failed_submit_is_kept_and_reported() {
    let (controller, remote, _, _) = setup();
    let errors = controller.subscribe_errors();
    controller.activate(P).unwrap();
    remote.set_connected(false);

    let write = controller
        .append_optimistic(text_entry(0, P, "offline"))
        .unwrap();
    let err = write.wait().unwrap_err();
    assert!(err.is_retryable());

    let entries = controller.get_entries(P);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status(), EntryStatus::Failed);
    assert!(entries[0].is_visible());

    let report = errors.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(report.context, ErrorContext::Submit);
    assert_eq!(report.partition, Some(P));
    assert_eq!(controller.stats().submit_failures, 1);
}

#[test]
fn stale_fetch_is_discarded() {
    let (controller, remote, store, _) = setup();
    for entry in confirmed_history(P, 1, 3) {
        remote.insert_server_entry(entry);
    }
    for entry in confirmed_history(Q, 100, 2) {
        remote.insert_server_entry(entry);
    }
    remote.hold_fetches(true);

    let first = {
        let controller = controller.clone();
        thread::spawn(move || controller.activate(P))
    };
    wait_until(|| remote.fetch_calls().len() == 1);

    let second = {
        let controller = controller.clone();
        thread::spawn(move || controller.activate(Q))
    };
    wait_until(|| remote.fetch_calls().len() == 2);
    remote.hold_fetches(false);

    assert_eq!(first.join().unwrap().unwrap(), FetchOutcome::Discarded);
    assert!(matches!(
        second.join().unwrap().unwrap(),
        FetchOutcome::Applied { entries: 2, .. }
    ));

    assert_eq!(controller.active_partition(), Some(Q));
    assert!(controller.get_entries(P).is_empty());
    assert_eq!(ids(&controller.get_entries(Q)), vec![100, 101]);
    assert!(store.get(EntryId::new(1)).is_none());
    assert_eq!(controller.stats().discarded_fetches, 1);
}

#[test]
fn persistence_failure_keeps_memory_state() {
    let (controller, remote, store, _) = setup();
    for entry in confirmed_history(P, 1, 3) {
        remote.insert_server_entry(entry);
    }
    store.set_failing(true);
    let errors = controller.subscribe_errors();

    let outcome = controller.activate(P).unwrap();

    assert!(matches!(outcome, FetchOutcome::Applied { entries: 3, .. }));
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 2, 3]);
    assert_eq!(controller.phase(P), PartitionPhase::Synced);

    let last = controller.last_error().unwrap();
    assert!(matches!(last.error, SyncError::Persistence(_)));
    let contexts: Vec<ErrorContext> = errors.try_iter().map(|r| r.context).collect();
    assert!(contexts.contains(&ErrorContext::Hydrate));
    assert!(contexts.contains(&ErrorContext::Persist));
    assert_eq!(controller.stats().persistence_failures, 1);
}

#[test]
fn reconnect_fetches_after_cursor() {
    let (controller, remote, _, _) = setup();
    for entry in confirmed_history(P, 1, 3) {
        remote.insert_server_entry(entry);
    }
    controller.activate(P).unwrap();
    assert_eq!(controller.cursor(P), Some(3));

    remote.insert_server_entry(text_entry(4, P, "later").with_sequence(4).with_position(4.0));
    let outcome = controller.trigger(ResyncTrigger::Reconnect).unwrap();

    assert!(matches!(
        outcome,
        FetchOutcome::Applied {
            entries: 1,
            cursor: Some(4),
            ..
        }
    ));
    let last_call = *remote.fetch_calls().last().unwrap();
    assert_eq!(last_call.after_sequence, Some(3));
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 2, 3, 4]);
    assert_eq!(controller.stats().resyncs, 1);
}

#[test]
fn trigger_without_partition_is_skipped() {
    let (controller, remote, _, _) = setup();
    assert_eq!(
        controller.trigger(ResyncTrigger::Foreground).unwrap(),
        FetchOutcome::Skipped
    );
    assert!(remote.fetch_calls().is_empty());
}

#[test]
fn fetch_follows_pages() {
    let (controller, remote, _, _) = setup_with(
        SyncConfig::default().with_page_size(2),
        MemoryStore::new(),
    );
    for entry in confirmed_history(P, 1, 5) {
        remote.insert_server_entry(entry);
    }

    let outcome = controller.activate(P).unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Applied {
            pages: 3,
            entries: 5,
            cursor: Some(5),
        }
    );
    let cursors: Vec<Option<u64>> = remote
        .fetch_calls()
        .iter()
        .map(|c| c.after_sequence)
        .collect();
    assert_eq!(cursors, vec![None, Some(2), Some(4)]);
}

#[test]
fn page_cap_leaves_partition_stale() {
    let (controller, remote, _, _) = setup_with(
        SyncConfig::default()
            .with_page_size(2)
            .with_max_pages_per_sync(1),
        MemoryStore::new(),
    );
    for entry in confirmed_history(P, 1, 5) {
        remote.insert_server_entry(entry);
    }

    controller.activate(P).unwrap();
    assert_eq!(controller.phase(P), PartitionPhase::HydratedStale);
    assert_eq!(controller.cursor(P), Some(2));

    controller.refresh().unwrap();
    controller.refresh().unwrap();
    assert_eq!(controller.phase(P), PartitionPhase::Synced);
    assert_eq!(controller.get_entries(P).len(), 5);
}

#[test]
fn offline_activation_serves_stored_entries() {
    let (controller, remote, _, _) = setup_with(
        SyncConfig::default(),
        MemoryStore::with_entries(confirmed_history(P, 1, 2)),
    );
    remote.set_connected(false);

    let err = controller.activate(P).unwrap_err();

    assert!(matches!(err, SyncError::TransientNetwork { .. }));
    assert_eq!(controller.phase(P), PartitionPhase::HydratedStale);
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 2]);
    assert_eq!(controller.last_error().unwrap().context, ErrorContext::Fetch);
}

#[test]
fn push_for_inactive_partition_is_written_through() {
    let (controller, remote, store, _) = setup();
    controller.activate(P).unwrap();

    let other = text_entry(50, Q, "elsewhere")
        .with_sequence(50)
        .with_position(50.0);
    let outcome = controller.apply_push(&[other.clone()]).unwrap();

    assert_eq!(outcome.inserted, 1);
    assert!(controller.get_entries(Q).is_empty());
    assert_eq!(store.get(EntryId::new(50)), Some(other));
    // Q was never fetched, so the next activation still starts from scratch.
    assert_eq!(store.sync_cursor(Q).unwrap(), Some(0));

    controller.activate(Q).unwrap();
    let last_call = *remote.fetch_calls().last().unwrap();
    assert_eq!(last_call.partition, Q);
    assert_eq!(last_call.after_sequence, None);
    assert_eq!(ids(&controller.get_entries(Q)), vec![50]);
}

#[test]
fn pushed_entries_do_not_move_the_stored_cursor() {
    let (controller, remote, store, _) = setup();
    for entry in confirmed_history(P, 1, 3) {
        remote.insert_server_entry(entry);
    }
    controller.activate(P).unwrap();
    controller.activate(Q).unwrap();
    assert_eq!(store.sync_cursor(P).unwrap(), Some(3));

    let later: Vec<Entry> = (4..=6)
        .map(|n| {
            text_entry(n, P, &format!("message {n}"))
                .with_sequence(n as u64)
                .with_position(n as f64)
        })
        .collect();
    for entry in &later {
        remote.insert_server_entry(entry.clone());
    }
    controller.apply_push(&later[2..]).unwrap();
    assert!(store.get(EntryId::new(6)).is_some());
    assert_eq!(store.sync_cursor(P).unwrap(), Some(3));

    controller.activate(P).unwrap();
    let last_call = *remote.fetch_calls().last().unwrap();
    assert_eq!(last_call.partition, P);
    assert_eq!(last_call.after_sequence, Some(3));
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(store.sync_cursor(P).unwrap(), Some(6));
}

#[test]
fn push_during_hydration_merges_into_stored_entry() {
    init_tracing();
    let stored = text_entry(40, P, "hello")
        .with_sequence(12)
        .with_position(4.0);
    let store = Arc::new(GatedStore {
        inner: MemoryStore::with_entries([stored]),
        ..GatedStore::default()
    });
    let controller = Arc::new(
        SyncController::new(SyncConfig::default(), Arc::new(MockRemote::new()), store.clone())
            .with_clock(Arc::new(ManualClock::new(START))),
    );

    let activation = {
        let controller = controller.clone();
        thread::spawn(move || controller.activate(P))
    };
    store.reads.wait_for_caller();

    let push = {
        let controller = controller.clone();
        thread::spawn(move || {
            controller.apply_push(&[Entry::new(EntryId::new(40), P).with_annotations(["new"])])
        })
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!push.is_finished());
    store.reads.open();

    activation.join().unwrap().unwrap();
    assert!(push.join().unwrap().is_some());

    let entries = controller.get_entries(P);
    assert_eq!(entries.len(), 1);
    let persisted = store.inner.get(EntryId::new(40)).unwrap();
    for entry in [&entries[0], &persisted] {
        assert_eq!(entry.content.as_deref(), Some("hello"));
        assert_eq!(entry.position, Some(4.0));
        assert_eq!(entry.sequence, Some(12));
        assert!(entry.annotations.as_ref().unwrap().contains("new"));
    }
}

#[test]
fn confirmation_after_switch_is_written_through() {
    for persist_tentative in [false, true] {
        let config = SyncConfig::default().with_persist_tentative(persist_tentative);
        let (controller, remote, store) = gated_setup(config);
        controller.activate(P).unwrap();

        let write = controller
            .append_optimistic(text_entry(0, P, "sent before switch"))
            .unwrap();
        let local = write.local_id();
        remote.submits.wait_for_caller();
        controller.activate(Q).unwrap();
        remote.submits.open();

        let confirmed = write.wait().unwrap();
        assert!(controller.get_entries(Q).is_empty());
        assert_eq!(
            store.get(confirmed.id).unwrap().content.as_deref(),
            Some("sent before switch")
        );
        assert!(store.get(local).is_none());

        remote.inner.set_connected(false);
        assert!(controller.activate(P).is_err());
        assert_eq!(ids(&controller.get_entries(P)), vec![confirmed.id.as_i64()]);
    }
}

#[test]
fn failure_after_switch_keeps_failed_entry() {
    for persist_tentative in [false, true] {
        let config = SyncConfig::default().with_persist_tentative(persist_tentative);
        let (controller, remote, store) = gated_setup(config);
        controller.activate(P).unwrap();

        let write = controller
            .append_optimistic(text_entry(0, P, "never sent"))
            .unwrap();
        let local = write.local_id();
        remote.submits.wait_for_caller();
        controller.activate(Q).unwrap();
        remote.inner.set_connected(false);
        remote.submits.open();

        assert!(write.wait().unwrap_err().is_retryable());
        assert_eq!(store.get(local).unwrap().status(), EntryStatus::Failed);
        assert_eq!(controller.last_error().unwrap().context, ErrorContext::Submit);

        assert!(controller.activate(P).is_err());
        let entries = controller.get_entries(P);
        assert_eq!(ids(&entries), vec![local.as_i64()]);
        assert_eq!(entries[0].status(), EntryStatus::Failed);
        assert_eq!(entries[0].content.as_deref(), Some("never sent"));
    }
}

#[test]
fn failed_entry_is_stored_without_tentative_persistence() {
    let (controller, remote, store, _) = setup();
    controller.activate(P).unwrap();
    remote.set_connected(false);

    let err = controller
        .append_blocking(text_entry(0, P, "offline"))
        .unwrap_err();
    assert!(err.is_retryable());

    let stored = store.query_by_partition(P).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status(), EntryStatus::Failed);
}

#[test]
fn submit_finishing_after_shutdown_is_ignored() {
    let (controller, remote, store) = gated_setup(SyncConfig::default());
    controller.activate(P).unwrap();

    let write = controller
        .append_optimistic(text_entry(0, P, "in flight"))
        .unwrap();
    let local = write.local_id();
    remote.submits.wait_for_caller();
    controller.shutdown();
    let writes = store.writes().len();
    remote.submits.open();

    let confirmed = write.wait().unwrap();
    assert!(store.get(confirmed.id).is_none());
    assert_eq!(store.writes().len(), writes);
    assert_eq!(ids(&controller.get_entries(P)), vec![local.as_i64()]);
}

#[test]
fn remove_and_replace() {
    let (controller, remote, store, _) = setup();
    for entry in confirmed_history(P, 1, 3) {
        remote.insert_server_entry(entry);
    }
    controller.activate(P).unwrap();

    controller.remove_entry(EntryId::new(2)).unwrap();
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 3]);
    assert!(store.get(EntryId::new(2)).is_none());
    assert!(matches!(
        controller.remove_entry(EntryId::new(2)),
        Err(SyncError::EntryNotFound { .. })
    ));

    let edited = text_entry(1, P, "edited")
        .with_sequence(1)
        .with_position(1.0);
    controller.replace_entry(EntryId::new(1), edited).unwrap();
    let entries = controller.get_entries(P);
    assert_eq!(entries[0].content.as_deref(), Some("edited"));
    assert_eq!(
        store.get(EntryId::new(1)).unwrap().content.as_deref(),
        Some("edited")
    );

    let wrong_partition = text_entry(3, Q, "moved");
    assert!(matches!(
        controller.replace_entry(EntryId::new(3), wrong_partition),
        Err(SyncError::InvalidDraft(_))
    ));
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 3]);
}

#[test]
fn push_listener_applies_batches() {
    let (controller, remote, _, _) = setup();
    let (tx, feed) = push_channel();
    controller.activate(P).unwrap();
    let listener = controller.spawn_push_listener(feed);

    assert!(tx.send(confirmed_history(P, 1, 2)));
    wait_until(|| controller.get_entries(P).len() == 2);

    remote.set_echo(tx);
    controller.append_blocking(text_entry(0, P, "mine")).unwrap();
    wait_until(|| controller.stats().pushes_applied >= 2);
    assert_eq!(controller.get_entries(P).len(), 3);

    controller.shutdown();
    listener.join().unwrap();
}

#[test]
fn shutdown_stops_further_work() {
    let (controller, remote, store, _) = setup();
    for entry in confirmed_history(P, 1, 2) {
        remote.insert_server_entry(entry);
    }
    controller.activate(P).unwrap();
    let writes = store.writes().len();
    controller.shutdown();

    assert!(controller.is_shut_down());
    assert!(matches!(
        controller.append_blocking(text_entry(0, P, "late")),
        Err(SyncError::Cancelled)
    ));
    let late_push = text_entry(9, P, "late push").with_sequence(9);
    assert!(controller.apply_push(&[late_push]).is_none());
    assert!(matches!(
        controller.remove_entry(EntryId::new(1)),
        Err(SyncError::Cancelled)
    ));
    let edited = text_entry(2, P, "edited").with_sequence(2).with_position(2.0);
    assert!(matches!(
        controller.replace_entry(EntryId::new(2), edited),
        Err(SyncError::Cancelled)
    ));

    assert_eq!(store.writes().len(), writes);
    assert_eq!(store.len(), 2);
    assert_eq!(ids(&controller.get_entries(P)), vec![1, 2]);
}

#[test]
fn tentative_entries_survive_reload() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entries.log");
    let config = SyncConfig::default().with_persist_tentative(true);
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(START));

    let remote = Arc::new(MockRemote::new());
    for entry in confirmed_history(P, 1, 2) {
        remote.insert_server_entry(entry);
    }

    {
        let store = Arc::new(LogStore::open_file(&path, LogStoreConfig::default()).unwrap());
        let controller = SyncController::new(config.clone(), remote.clone(), store)
            .with_clock(clock.clone());
        controller.activate(P).unwrap();
        remote.set_connected(false);
        assert!(controller.append_blocking(text_entry(0, P, "unsent")).is_err());
    }

    let store = Arc::new(LogStore::open_file(&path, LogStoreConfig::default()).unwrap());
    let stored = store.query_by_partition(P).unwrap();
    assert_eq!(stored.len(), 3);

    let controller =
        SyncController::new(config, remote.clone(), store.clone()).with_clock(clock);
    assert!(controller.activate(P).is_err());

    let entries = controller.get_entries(P);
    assert_eq!(ids(&entries), vec![1, 2, -1]);
    assert_eq!(entries[2].status(), EntryStatus::Failed);

    assert!(controller.append_blocking(text_entry(0, P, "again")).is_err());
    let ids_after: Vec<i64> = ids(&controller.get_entries(P));
    assert!(ids_after.contains(&-2));
}

#[test]
fn confirmed_entries_reach_log_store() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("entries.log");
    let remote = Arc::new(MockRemote::new());
    for entry in confirmed_history(P, 1, 4) {
        remote.insert_server_entry(entry);
    }

    {
        let store = Arc::new(LogStore::open_file(&path, LogStoreConfig::default()).unwrap());
        let controller = SyncController::new(SyncConfig::default(), remote.clone(), store);
        controller.activate(P).unwrap();
        controller.append_blocking(text_entry(0, P, "fifth")).unwrap();
    }

    let store = LogStore::open_file(&path, LogStoreConfig::default()).unwrap();
    let mut stored = store.query_by_partition(P).unwrap();
    stored.sort_by_key(|e| e.sequence);
    assert_eq!(stored.len(), 5);
    assert!(stored.iter().all(|e| e.id.is_confirmed()));
    assert_eq!(stored[4].content.as_deref(), Some("fifth"));
}
