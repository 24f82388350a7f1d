//! In-memory backend for tests and ephemeral sessions.

use super::LogBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;

/// A backend holding its bytes in memory.
///
/// ```rust
/// use msgcache_store::{InMemoryBackend, LogBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let offset = backend.append(b"abc").unwrap();
/// assert_eq!(backend.read_at(offset, 3).unwrap(), b"abc");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    data: RwLock<Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend seeded with existing bytes.
    ///
    /// Useful for replaying damaged logs in recovery tests.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }
}

impl LogBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = usize::try_from(offset).map_err(|_| StoreError::ReadPastEnd {
            offset,
            len,
            size,
        })?;
        let end = start.saturating_add(len);

        if end > data.len() {
            return Err(StoreError::ReadPastEnd { offset, len, size });
        }
        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StoreResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        let mut data = self.data.write();
        let current = data.len() as u64;
        if new_size > current {
            return Err(StoreError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: current,
            });
        }
        // new_size <= len, so it fits in usize
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace_all(&mut self, bytes: &[u8]) -> StoreResult<()> {
        *self.data.write() = bytes.to_vec();
        Ok(())
    }
}
