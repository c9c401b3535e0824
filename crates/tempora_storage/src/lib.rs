//! # Tempora Storage
//!
//! Byte-store backends for Tempora.
//!
//! Backends are **opaque byte stores**: the write logs in `tempora_core`
//! own the record framing, checksums and replay rules, and a backend only
//! has to append, read back, flush and truncate bytes.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral engines and tests; cloning shares the
//!   same bytes, which lets tests "reopen" an in-memory log
//! - [`FileBackend`] - a single file accessed through the OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tempora_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"ADD name AS jeff IN 1").unwrap();
//! let data = backend.read_at(offset, 3).unwrap();
//! assert_eq!(&data, b"ADD");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
