//! Write log record types and payload encoding.

use crate::error::{CoreError, CoreResult};
use crate::types::Version;
use crate::write::Write;
use tempora_codec::{Decode, Encode};

/// Magic bytes opening every record.
pub const LOG_MAGIC: [u8; 4] = *b"TLOG";

/// Current format version.
pub const LOG_VERSION: u16 = 1;

/// Type of a write log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A write entered the store.
    Append = 1,
    /// The oldest write left the store.
    Consume = 2,
    /// Several writes entered the store together.
    Batch = 3,
}

impl LogRecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Append),
            2 => Some(Self::Consume),
            3 => Some(Self::Batch),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One entry in a write log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// A write entered the store. Payload: the CBOR write envelope.
    Append(Write),
    /// The oldest write, stamped `version`, left the store.
    Consume(Version),
    /// Writes that entered the store as one unit. Payload: a `u32` count,
    /// then each write envelope prefixed by its `u32` length. A torn batch
    /// is dropped whole.
    Batch(Vec<Write>),
}

impl LogRecord {
    /// The record's type tag.
    #[must_use]
    pub fn record_type(&self) -> LogRecordType {
        match self {
            Self::Append(_) => LogRecordType::Append,
            Self::Consume(_) => LogRecordType::Consume,
            Self::Batch(_) => LogRecordType::Batch,
        }
    }

    /// Encodes the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the write's value cannot be encoded.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        match self {
            Self::Append(write) => Ok(write.encode()?),
            Self::Consume(version) => Ok(version.as_u64().to_le_bytes().to_vec()),
            Self::Batch(writes) => {
                let mut payload = Vec::new();
                payload.extend_from_slice(&length_prefix(writes.len())?);
                for write in writes {
                    let envelope = write.encode()?;
                    payload.extend_from_slice(&length_prefix(envelope.len())?);
                    payload.extend_from_slice(&envelope);
                }
                Ok(payload)
            }
        }
    }

    /// Decodes a payload of the given type.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed.
    pub fn decode_payload(record_type: LogRecordType, payload: &[u8]) -> CoreResult<Self> {
        match record_type {
            LogRecordType::Append => Ok(Self::Append(Write::decode(payload)?)),
            LogRecordType::Consume => {
                let bytes: [u8; 8] = payload.try_into().map_err(|_| {
                    CoreError::log_corruption(format!(
                        "consume payload is {} bytes, expected 8",
                        payload.len()
                    ))
                })?;
                Ok(Self::Consume(Version::new(u64::from_le_bytes(bytes))))
            }
            LogRecordType::Batch => {
                let mut rest = payload;
                let count = take_length(&mut rest)?;
                let mut writes = Vec::with_capacity(count.min(rest.len()));
                for _ in 0..count {
                    let len = take_length(&mut rest)?;
                    if rest.len() < len {
                        return Err(CoreError::log_corruption("batch envelope runs past payload"));
                    }
                    let (envelope, tail) = rest.split_at(len);
                    writes.push(Write::decode(envelope)?);
                    rest = tail;
                }
                if !rest.is_empty() {
                    return Err(CoreError::log_corruption(format!(
                        "{} trailing bytes after batch",
                        rest.len()
                    )));
                }
                Ok(Self::Batch(writes))
            }
        }
    }
}

fn length_prefix(len: usize) -> CoreResult<[u8; 4]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| CoreError::invalid_argument("batch exceeds u32 lengths"))
}

fn take_length(rest: &mut &[u8]) -> CoreResult<usize> {
    if rest.len() < 4 {
        return Err(CoreError::log_corruption("truncated batch length"));
    }
    let (head, tail) = rest.split_at(4);
    *rest = tail;
    Ok(u32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize)
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_types() {
        for t in [
            LogRecordType::Append,
            LogRecordType::Consume,
            LogRecordType::Batch,
        ] {
            assert_eq!(LogRecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(LogRecordType::from_byte(9), None);
    }

    #[test]
    fn append_payload_is_the_write_envelope() {
        let write = Write::add("name", "jeff", 1, Version::new(77));
        let record = LogRecord::Append(write.clone());
        let payload = record.encode_payload().unwrap();
        assert_eq!(payload, write.encode().unwrap());
        let decoded = LogRecord::decode_payload(LogRecordType::Append, &payload).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn consume_payload_is_eight_bytes() {
        let record = LogRecord::Consume(Version::new(1_234));
        let payload = record.encode_payload().unwrap();
        assert_eq!(payload.len(), 8);
        assert_eq!(
            LogRecord::decode_payload(LogRecordType::Consume, &payload).unwrap(),
            record
        );
        assert!(LogRecord::decode_payload(LogRecordType::Consume, &payload[..3]).is_err());
    }

    #[test]
    fn batch_payload_keeps_every_write() {
        let writes = vec![
            Write::add("a", 1, 1, Version::new(4)),
            Write::add("b", "two", 1, Version::new(5)),
            Write::remove("a", 1, 1, Version::new(6)),
        ];
        let record = LogRecord::Batch(writes);
        let payload = record.encode_payload().unwrap();
        assert_eq!(
            LogRecord::decode_payload(LogRecordType::Batch, &payload).unwrap(),
            record
        );
        for cut in [2, 7, payload.len() - 1] {
            assert!(LogRecord::decode_payload(LogRecordType::Batch, &payload[..cut]).is_err());
        }
    }

    #[test]
    fn crc32_known_values() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }
}
