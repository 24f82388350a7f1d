//! The authoritative remote source.

use crate::error::{SyncError, SyncResult};
use crate::push::PushSender;
use msgcache_core::{Entry, EntryId, PartitionId};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// One page of an incremental fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchPage {
    /// Confirmed entries with `sequence > after_sequence`.
    pub entries: Vec<Entry>,
    /// Cursor to resume from, if the remote supplies one.
    pub next_cursor: Option<u64>,
    /// True if no further pages follow.
    pub is_last: bool,
}

/// The remote source that assigns ids, sequences and order.
///
/// This trait abstracts the network layer. Transport, retry and
/// authentication live behind it.
pub trait RemoteSource: Send + Sync {
    /// Fetches confirmed entries of `partition` with sequence above
    /// `after_sequence` (`None` starts from the beginning).
    fn fetch_page(
        &self,
        partition: PartitionId,
        after_sequence: Option<u64>,
        page_size: u32,
    ) -> SyncResult<FetchPage>;

    /// Submits a draft and returns its confirmed form.
    fn submit_entry(&self, draft: &Entry) -> SyncResult<Entry>;
}

/// A fetch request seen by [`MockRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCall {
    /// Requested partition.
    pub partition: PartitionId,
    /// Requested cursor.
    pub after_sequence: Option<u64>,
    /// Requested page size.
    pub page_size: u32,
}

#[derive(Debug, Default)]
struct MockState {
    partitions: HashMap<PartitionId, Vec<Entry>>,
    next_id: i64,
    fetch_calls: Vec<FetchCall>,
    submitted: Vec<Entry>,
    reject_submits: Option<String>,
    echo: Option<PushSender>,
    hold_fetches: bool,
}

/// An in-memory remote for tests.
///
/// It keeps a server-side log per partition, assigns ids and sequences to
/// submitted drafts and can optionally echo every confirmed submit through a
/// push feed, like a real server broadcasting to all clients.
#[derive(Debug)]
pub struct MockRemote {
    connected: AtomicBool,
    state: Mutex<MockState>,
    released: Condvar,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemote {
    /// Creates a connected remote with no entries. Ids start at 1000.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(MockState {
                next_id: 1000,
                ..MockState::default()
            }),
            released: Condvar::new(),
        }
    }

    /// Sets the connected state. A disconnected remote fails every call with
    /// a transient error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if connected.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Stores a confirmed entry server-side as-is, replacing by id.
    pub fn insert_server_entry(&self, entry: Entry) {
        let mut state = self.state.lock();
        let log = state.partitions.entry(entry.partition_id).or_default();
        log.retain(|e| e.id != entry.id);
        log.push(entry);
    }

    /// Echoes every confirmed submit through `sender`.
    pub fn set_echo(&self, sender: PushSender) {
        self.state.lock().echo = Some(sender);
    }

    /// Makes submits fail with [`SyncError::Remote`] until cleared with `None`.
    pub fn set_reject_submits(&self, reason: Option<String>) {
        self.state.lock().reject_submits = reason;
    }

    /// Blocks fetches until released with `false`.
    pub fn hold_fetches(&self, hold: bool) {
        self.state.lock().hold_fetches = hold;
        if !hold {
            self.released.notify_all();
        }
    }

    /// Fetch requests received so far.
    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.state.lock().fetch_calls.clone()
    }

    /// Drafts accepted so far, in their confirmed form.
    pub fn submitted(&self) -> Vec<Entry> {
        self.state.lock().submitted.clone()
    }

    /// Server-side entries of a partition ordered by sequence.
    pub fn server_entries(&self, partition: PartitionId) -> Vec<Entry> {
        let mut entries = self
            .state
            .lock()
            .partitions
            .get(&partition)
            .cloned()
            .unwrap_or_default();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::transient("remote unreachable"))
        }
    }
}

impl RemoteSource for MockRemote {
    fn fetch_page(
        &self,
        partition: PartitionId,
        after_sequence: Option<u64>,
        page_size: u32,
    ) -> SyncResult<FetchPage> {
        let mut state = self.state.lock();
        state.fetch_calls.push(FetchCall {
            partition,
            after_sequence,
            page_size,
        });
        while state.hold_fetches {
            self.released.wait(&mut state);
        }
        drop(state);
        self.check_connected()?;

        let after = after_sequence.unwrap_or(0);
        let mut newer: Vec<Entry> = self
            .server_entries(partition)
            .into_iter()
            .filter(|e| e.sequence.is_some_and(|s| s > after))
            .collect();

        let limit = page_size as usize;
        let is_last = newer.len() <= limit;
        newer.truncate(limit);
        let next_cursor = newer.last().and_then(|e| e.sequence);

        Ok(FetchPage {
            entries: newer,
            next_cursor,
            is_last,
        })
    }

    fn submit_entry(&self, draft: &Entry) -> SyncResult<Entry> {
        self.check_connected()?;

        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_submits {
            return Err(SyncError::Remote(reason.clone()));
        }

        let id = EntryId::new(state.next_id);
        state.next_id += 1;
        let sequence = state
            .partitions
            .get(&draft.partition_id)
            .and_then(|log| log.iter().filter_map(|e| e.sequence).max())
            .unwrap_or(0)
            + 1;

        let mut confirmed = draft.clone();
        confirmed.id = id;
        confirmed.sequence = Some(sequence);
        confirmed.status = None;

        state
            .partitions
            .entry(confirmed.partition_id)
            .or_default()
            .push(confirmed.clone());
        state.submitted.push(confirmed.clone());

        if let Some(echo) = &state.echo {
            echo.send(vec![confirmed.clone()]);
        }
        Ok(confirmed)
    }
}
