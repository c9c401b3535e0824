//! Error types for Tempora core.

use crate::tokens::Token;
use crate::types::Version;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tempora core operations.
///
/// Reads never fail because data is missing; absence is an empty result.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] tempora_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] tempora_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The caller broke an operation's contract (bad operator, missing
    /// operands, invalid pattern). Retrying the same call cannot succeed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// Another actor changed data this transaction depends on. The
    /// transaction's staged writes are gone; retry it from the start.
    #[error("transaction conflict on {token}")]
    TransactionConflict {
        /// The version token whose change was announced.
        token: Token,
    },

    /// Operation on a transaction that already committed or aborted.
    #[error("transaction is closed")]
    TransactionClosed,

    /// The permanent store refused a write during transport. The write
    /// stays in the buffer.
    #[error("permanent store rejected write at version {version}: {reason}")]
    Rejected {
        /// Version of the refused write.
        version: Version,
        /// Why the store refused it.
        reason: String,
    },

    /// A write log failed validation during recovery.
    #[error("write log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Another process holds the engine directory lock.
    #[error("engine locked: another process has exclusive access")]
    EngineLocked,

    /// The engine directory does not exist and creation was disabled.
    #[error("engine directory not found: {}", path.display())]
    NotFound {
        /// The missing directory.
        path: PathBuf,
    },
}

impl CoreError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a write log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates a transport rejection error.
    pub fn rejected(version: Version, reason: impl Into<String>) -> Self {
        Self::Rejected {
            version,
            reason: reason.into(),
        }
    }

    /// Creates a transaction conflict error.
    #[must_use]
    pub fn conflict(token: Token) -> Self {
        Self::TransactionConflict { token }
    }

    /// Whether retrying the whole transaction may succeed.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_distinguishable() {
        let err = CoreError::conflict(Token::cell("foo", 1));
        assert!(err.is_conflict());
        assert_eq!(err.to_string(), "transaction conflict on foo in 1");
        assert!(!CoreError::invalid_argument("BETWEEN needs two values").is_conflict());
        assert!(!CoreError::TransactionClosed.is_conflict());
    }

    #[test]
    fn messages() {
        assert_eq!(
            CoreError::rejected(Version::new(7), "disk full").to_string(),
            "permanent store rejected write at version 7: disk full"
        );
        let crc = CoreError::ChecksumMismatch {
            expected: 0xdead_beef,
            actual: 1,
        };
        assert_eq!(
            crc.to_string(),
            "checksum mismatch: expected deadbeef, got 00000001"
        );
    }

    #[test]
    fn lower_layer_errors_convert() {
        let err: CoreError = tempora_codec::CodecError::NaNForbidden.into();
        assert!(matches!(err, CoreError::Codec(_)));
        let err: CoreError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
