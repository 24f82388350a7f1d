//! Push channel for confirmed entries.
//!
//! The remote delivers confirmed entries asynchronously and at least once,
//! with no ordering guarantee relative to fetched pages. Each message is a
//! batch that the controller reconciles in one call.

use msgcache_core::Entry;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

/// Creates a connected sender/feed pair.
pub fn push_channel() -> (PushSender, PushFeed) {
    let (tx, rx) = mpsc::channel();
    (PushSender { tx }, PushFeed { rx })
}

/// Sending half of a push channel.
#[derive(Debug, Clone)]
pub struct PushSender {
    tx: Sender<Vec<Entry>>,
}

impl PushSender {
    /// Delivers a batch. Returns false if the feed has been dropped.
    pub fn send(&self, batch: Vec<Entry>) -> bool {
        self.tx.send(batch).is_ok()
    }
}

/// What a feed produced when polled.
#[derive(Debug)]
pub enum PushPoll {
    /// A batch arrived.
    Batch(Vec<Entry>),
    /// Nothing arrived in time.
    Idle,
    /// Every sender is gone.
    Closed,
}

/// Receiving half of a push channel.
#[derive(Debug)]
pub struct PushFeed {
    rx: Receiver<Vec<Entry>>,
}

impl PushFeed {
    /// Waits up to `timeout` for the next batch.
    pub fn poll(&self, timeout: Duration) -> PushPoll {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) => PushPoll::Batch(batch),
            Err(RecvTimeoutError::Timeout) => PushPoll::Idle,
            Err(RecvTimeoutError::Disconnected) => PushPoll::Closed,
        }
    }

    /// Returns every batch already queued.
    pub fn drain(&self) -> Vec<Vec<Entry>> {
        self.rx.try_iter().collect()
    }
}
