//! Write log framing, appends and recovery.

use super::record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
use crate::error::{CoreError, CoreResult};
use tempora_storage::StorageBackend;

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// An append-only log of [`LogRecord`]s on a byte store.
///
/// Not internally synchronized; owners keep it behind their own lock so a
/// log append and the in-memory change it mirrors happen together.
pub struct WriteLog {
    backend: Box<dyn StorageBackend>,
}

impl WriteLog {
    /// Wraps `backend`. Call [`WriteLog::recover`] before appending to a
    /// backend that may already hold records.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Reads every intact record, cutting off a torn tail.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] or [`CoreError::ChecksumMismatch`]
    /// when a complete record fails validation.
    pub fn recover(&mut self) -> CoreResult<Vec<LogRecord>> {
        let bytes = self.backend.read_all()?;
        let (records, intact) = parse(&bytes)?;
        if intact < bytes.len() {
            tracing::warn!(
                intact,
                torn = bytes.len() - intact,
                "discarding torn write log tail"
            );
            self.backend.truncate(intact as u64)?;
            self.backend.sync()?;
        }
        Ok(records)
    }

    /// Appends `record`, returning its offset. With `sync` the record is
    /// durable before this returns. On failure the log is cut back to its
    /// previous length, so a failed append never resurfaces on recovery.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn append(&mut self, record: &LogRecord, sync: bool) -> CoreResult<u64> {
        let framed = frame(record)?;
        let before = self.backend.size()?;
        let written = self.backend.append(&framed).and_then(|offset| {
            if sync {
                self.backend.flush()?;
                self.backend.sync()?;
            }
            Ok(offset)
        });
        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(cut) = self.backend.truncate(before) {
                    tracing::warn!(error = %cut, before, "could not roll back failed append");
                }
                Err(err.into())
            }
        }
    }

    /// Flushes and fsyncs everything appended so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot sync.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.backend.flush()?;
        self.backend.sync()?;
        Ok(())
    }

    /// Drops every record. Used once the mirrored store is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot truncate.
    pub fn reset(&mut self) -> CoreResult<()> {
        self.backend.truncate(0)?;
        Ok(())
    }

    /// Current size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }
}

impl std::fmt::Debug for WriteLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteLog")
            .field("size", &self.backend.size().ok())
            .finish()
    }
}

/// Wraps a record in its envelope.
fn frame(record: &LogRecord) -> CoreResult<Vec<u8>> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_argument("write log payload exceeds 4 GiB"))?;

    let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    data.extend_from_slice(&LOG_MAGIC);
    data.extend_from_slice(&LOG_VERSION.to_le_bytes());
    data.push(record.record_type().as_byte());
    data.extend_from_slice(&len.to_le_bytes());
    data.extend_from_slice(&payload);
    let crc = compute_crc32(&data);
    data.extend_from_slice(&crc.to_le_bytes());
    Ok(data)
}

/// Parses records from `bytes`; returns them with the length of the intact
/// prefix.
fn parse(bytes: &[u8]) -> CoreResult<(Vec<LogRecord>, usize)> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(format!(
                "invalid magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version > LOG_VERSION {
            return Err(CoreError::log_corruption(format!(
                "unsupported version {version} at offset {offset}"
            )));
        }
        let record_type = LogRecordType::from_byte(rest[6]).ok_or_else(|| {
            CoreError::log_corruption(format!(
                "unknown record type {} at offset {offset}",
                rest[6]
            ))
        })?;
        let payload_len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if rest.len() < total {
            break;
        }
        let body_end = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let computed = compute_crc32(&rest[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }
        records.push(LogRecord::decode_payload(
            record_type,
            &rest[HEADER_SIZE..body_end],
        )?);
        offset += total;
    }
    Ok((records, offset))
}
