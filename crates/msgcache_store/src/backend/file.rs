//! File backend for persistent storage.

use super::LogBackend;
use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A backend stored in a single file.
///
/// # Durability
///
/// - `sync()` calls `File::sync_all()`
/// - `replace_all()` writes a sibling temp file, syncs it and renames it over
///   the original, so a crash leaves either the old or the new contents
///
/// ```no_run
/// use msgcache_store::{FileBackend, LogBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("entries.log")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens or creates the file at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let file = open_rw(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Opens or creates the file, creating parent directories first.
    ///
    /// # Errors
    ///
    /// Fails if the directories or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".compact");
        self.path.with_file_name(name)
    }
}

fn open_rw(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

impl LogBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StoreResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64);
        if end > self.size {
            return Err(StoreError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StoreResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        file.flush()?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn size(&self) -> StoreResult<u64> {
        Ok(self.size)
    }

    fn sync(&mut self) -> StoreResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StoreResult<()> {
        if new_size > self.size {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "cannot truncate to {new_size} bytes, file is {} bytes",
                    self.size
                ),
            )));
        }

        let file = self.file.lock();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }

    fn replace_all(&mut self, data: &[u8]) -> StoreResult<()> {
        let temp = self.temp_path();
        {
            let mut staged = File::create(&temp)?;
            staged.write_all(data)?;
            staged.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        *self.file.lock() = open_rw(&self.path)?;
        self.size = data.len() as u64;
        Ok(())
    }
}
