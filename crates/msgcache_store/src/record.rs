//! On-disk record format of the entry log.
//!
//! Each durable operation is one framed record holding a batch of ops, so a
//! batch is applied entirely or not at all after a crash.
//!
//! ```text
//! +---------+-------+---------+----------------+-------+
//! | len u32 | magic | version | CBOR ops       | crc32 |
//! | 4 bytes | 2     | 1       | len - 11 bytes | 4     |
//! +---------+-------+---------+----------------+-------+
//! ```
//!
//! All integers are little-endian. `len` covers the whole record, and the
//! CRC covers every byte before it.

use crate::backend::LogBackend;
use crate::error::{StoreError, StoreResult};
use msgcache_core::{Entry, EntryId, PartitionId};
use serde::{Deserialize, Serialize};

/// Record magic, "MC".
pub const RECORD_MAGIC: [u8; 2] = *b"MC";

/// Current record format version.
pub const RECORD_VERSION: u8 = 1;

const LEN_SIZE: usize = 4;
const HEADER_SIZE: usize = LEN_SIZE + 2 + 1;
const CRC_SIZE: usize = 4;

/// A single mutation inside a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogOp {
    /// Insert or replace an entry by id.
    Upsert(Entry),
    /// Remove an entry by id.
    Delete(EntryId),
    /// Remove every entry of a partition and its cursor.
    ClearPartition(PartitionId),
    /// Replace the sync cursor of a partition.
    SetCursor(PartitionId, u64),
}

/// A batch of ops written atomically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Ops in application order.
    pub ops: Vec<LogOp>,
}

impl LogRecord {
    /// Creates a record from ops.
    #[must_use]
    pub fn new(ops: Vec<LogOp>) -> Self {
        Self { ops }
    }

    /// Encodes the record with its frame.
    ///
    /// # Errors
    ///
    /// Fails if the ops cannot be serialized or the record exceeds 4 GiB.
    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut payload = Vec::new();
        ciborium::into_writer(&self.ops, &mut payload)?;

        let total = HEADER_SIZE + payload.len() + CRC_SIZE;
        let len = u32::try_from(total)
            .map_err(|_| StoreError::Codec(format!("record of {total} bytes is too large")))?;

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&RECORD_MAGIC);
        buf.push(RECORD_VERSION);
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Decodes one complete framed record.
    ///
    /// # Errors
    ///
    /// Fails on a bad frame, a checksum mismatch or an undecodable payload.
    pub fn decode(data: &[u8]) -> StoreResult<Self> {
        if data.len() < HEADER_SIZE + CRC_SIZE {
            return Err(StoreError::corrupted("record too short"));
        }
        let len = read_len(data) as usize;
        if len != data.len() {
            return Err(StoreError::corrupted(format!(
                "record length {len} does not match frame of {} bytes",
                data.len()
            )));
        }

        let (body, crc_bytes) = data.split_at(len - CRC_SIZE);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(body);
        if expected != actual {
            return Err(StoreError::ChecksumMismatch { expected, actual });
        }

        if body[LEN_SIZE..LEN_SIZE + 2] != RECORD_MAGIC {
            return Err(StoreError::corrupted("bad record magic"));
        }
        let version = body[LEN_SIZE + 2];
        if version != RECORD_VERSION {
            return Err(StoreError::corrupted(format!(
                "unsupported record version {version}"
            )));
        }

        let ops: Vec<LogOp> = ciborium::from_reader(&body[HEADER_SIZE..])?;
        Ok(Self { ops })
    }
}

fn read_len(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// Result of scanning a backend from the start.
#[derive(Debug, Default)]
pub struct LogScan {
    /// Decoded records in log order.
    pub records: Vec<LogRecord>,
    /// Byte length of the valid prefix.
    pub valid_len: u64,
    /// True if an incomplete record was found after the valid prefix.
    pub torn_tail: bool,
}

/// Reads every record of a backend.
///
/// An incomplete record at the tail marks the clean end of the log: it is the
/// remains of an interrupted write. A complete record with a bad checksum is
/// corruption and fails the scan.
///
/// # Errors
///
/// Fails on I/O errors, checksum mismatches and malformed records.
pub fn scan<B: LogBackend + ?Sized>(backend: &B) -> StoreResult<LogScan> {
    let size = backend.size()?;
    let mut scan = LogScan::default();
    let mut offset = 0u64;

    while offset < size {
        if offset + LEN_SIZE as u64 > size {
            scan.torn_tail = true;
            break;
        }
        let len_bytes = backend.read_at(offset, LEN_SIZE)?;
        let len = u64::from(read_len(&len_bytes));

        if len < (HEADER_SIZE + CRC_SIZE) as u64 {
            return Err(StoreError::corrupted(format!(
                "record at offset {offset} declares impossible length {len}"
            )));
        }
        if offset + len > size {
            scan.torn_tail = true;
            break;
        }

        // len fits in u32, so in usize
        let data = backend.read_at(offset, len as usize)?;
        scan.records.push(LogRecord::decode(&data)?);
        offset += len;
    }

    scan.valid_len = offset;
    Ok(scan)
}

/// CRC-32 (IEEE polynomial, reflected).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const fn table() -> [u32; 256] {
        let mut table = [0u32; 256];
        let mut n = 0;
        while n < 256 {
            let mut c = n as u32;
            let mut k = 0;
            while k < 8 {
                c = if c & 1 == 1 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
                k += 1;
            }
            table[n] = c;
            n += 1;
        }
        table
    }
    const TABLE: [u32; 256] = table();

    !data.iter().fold(!0u32, |crc, &byte| {
        TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}
