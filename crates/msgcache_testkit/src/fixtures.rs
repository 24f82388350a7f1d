//! Entry fixtures and store helpers.

use msgcache_core::{Entry, EntryId, EntryKind, PartitionId};
use msgcache_store::{FileBackend, LogStore, LogStoreConfig};
use std::path::PathBuf;
use tempfile::TempDir;

/// Author used by the fixtures.
pub const TEST_AUTHOR: &str = "user-1";

/// A text entry by [`TEST_AUTHOR`].
pub fn text_entry(id: i64, partition: PartitionId, content: &str) -> Entry {
    Entry::new(EntryId::new(id), partition)
        .with_kind(EntryKind::Text)
        .with_author(TEST_AUTHOR)
        .with_role("member")
        .with_content(content)
}

/// An image entry whose binary payload is identified by `url`.
pub fn image_entry(id: i64, partition: PartitionId, caption: &str, url: &str) -> Entry {
    let filename = url.rsplit('/').next().unwrap_or(url).to_string();
    Entry::new(EntryId::new(id), partition)
        .with_kind(EntryKind::Image)
        .with_author(TEST_AUTHOR)
        .with_role("member")
        .with_content(caption)
        .with_payload_field("url", url)
        .with_payload_field("size", 48_213)
        .with_payload_field("filename", filename)
        .with_payload_field("width", 640)
        .with_payload_field("height", 480)
}

/// The server's echo of `tentative`: same content, canonical id and sequence.
pub fn confirm(tentative: &Entry, id: i64, sequence: u64) -> Entry {
    let mut echo = tentative.clone();
    echo.id = EntryId::new(id);
    echo.sequence = Some(sequence);
    echo.status = None;
    echo.updated_at = None;
    echo
}

/// `count` confirmed text entries with sequences and positions `1..=count`.
pub fn confirmed_history(partition: PartitionId, first_id: i64, count: u64) -> Vec<Entry> {
    (1..=count)
        .map(|n| {
            let offset = i64::try_from(n).unwrap_or(i64::MAX);
            text_entry(first_id + offset - 1, partition, &format!("message {n}"))
                .with_sequence(n)
                .with_position(n as f64)
        })
        .collect()
}

/// A file-backed log store with automatic cleanup.
pub struct TempLogStore {
    /// The store.
    pub store: LogStore<FileBackend>,
    dir: TempDir,
}

impl TempLogStore {
    /// Creates a store in a fresh temporary directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let store = LogStore::open_file(&dir.path().join("entries.log"), LogStoreConfig::default())
            .expect("Failed to open log store");
        Self { store, dir }
    }

    /// Closes and reopens the store from the same file.
    pub fn reopen(self) -> Self {
        let Self { store, dir } = self;
        drop(store);
        let store = LogStore::open_file(&dir.path().join("entries.log"), LogStoreConfig::default())
            .expect("Failed to reopen log store");
        Self { store, dir }
    }

    /// Path of the log file.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("entries.log")
    }
}

impl Default for TempLogStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TempLogStore {
    type Target = LogStore<FileBackend>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}
