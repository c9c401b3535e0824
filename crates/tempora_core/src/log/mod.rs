//! Append-only write logs.
//!
//! A write log mirrors a store's writes on a [`tempora_storage::StorageBackend`]
//! so they survive restart. The durable Limbo logs every staged write and
//! every write transport removes; the reference permanent store logs every
//! write it accepts.
//!
//! ## Record Format
//!
//! ```text
//! | magic "TLOG" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The CRC covers header and payload.
//!
//! ## Recovery Policy
//!
//! Tolerated, treated as a clean end of log (the torn bytes are cut off):
//!
//! - a trailing header shorter than 11 bytes
//! - a trailing record whose payload runs past the end
//!
//! Fatal, the store refuses to open:
//!
//! - bad magic, unknown record type or a newer format version
//!   ([`crate::CoreError::LogCorruption`])
//! - CRC mismatch ([`crate::CoreError::ChecksumMismatch`])

mod record;
mod writer;

pub use record::{compute_crc32, LogRecord, LogRecordType, LOG_MAGIC, LOG_VERSION};
pub use writer::WriteLog;
