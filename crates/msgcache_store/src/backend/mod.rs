//! Byte-level backends underneath the log store.
//!
//! Backends are opaque append-only byte stores. They know nothing about
//! records or entries; [`crate::LogStore`] owns the format.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::InMemoryBackend;

use crate::error::StoreResult;

/// An append-only byte store.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `sync` makes all appended data durable
pub trait LogBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails if the range extends past the end or an I/O error occurs.
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>>;

    /// Appends data and returns the offset it was written at.
    ///
    /// # Errors
    ///
    /// Fails if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StoreResult<u64>;

    /// Returns the current size in bytes.
    ///
    /// # Errors
    ///
    /// Fails if the size cannot be determined.
    fn size(&self) -> StoreResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Fails if the sync fails.
    fn sync(&mut self) -> StoreResult<()>;

    /// Drops everything after `new_size`.
    ///
    /// Used to cut a torn record off the tail during recovery.
    ///
    /// # Errors
    ///
    /// Fails if `new_size` exceeds the current size or an I/O error occurs.
    fn truncate(&mut self, new_size: u64) -> StoreResult<()>;

    /// Replaces the whole contents with `data`.
    ///
    /// The default truncates and appends, which is not atomic. Backends that
    /// can swap contents atomically should override it.
    ///
    /// # Errors
    ///
    /// Fails if an I/O error occurs.
    fn replace_all(&mut self, data: &[u8]) -> StoreResult<()> {
        self.truncate(0)?;
        self.append(data)?;
        self.sync()
    }
}
