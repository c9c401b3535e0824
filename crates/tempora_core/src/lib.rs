//! # Tempora Core
//!
//! Temporally-versioned storage engine.
//!
//! This crate provides:
//! - Limbo staging stores answered by replaying toggles up to a timestamp
//! - A durable Limbo backed by a checksummed write log
//! - Transport of staged writes into a permanent store, exactly once
//! - Version tokens and optimistic transactions
//! - The [`Engine`] facade tying them together
//!
//! ## Model
//!
//! Every change is a [`Write`]: ADD or REMOVE of `key -> value` in a
//! record, stamped with a [`Version`]. A mapping exists at time `t` iff an
//! odd number of writes for it have `version <= t`, so every read can be
//! answered at any point in the past.
//!
//! ```rust,ignore
//! use tempora_core::{Engine, Version};
//!
//! let engine = Engine::open_in_memory()?;
//! engine.add("foo", "bar", 1)?;
//! engine.add("foo", "baz", 1)?;
//! engine.remove("foo", "bar", 1)?;
//! assert_eq!(engine.select("foo", 1).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod dir;
mod engine;
mod error;
pub mod limbo;
pub mod log;
mod operator;
mod permanent;
pub mod search;
mod tokens;
mod transaction;
mod types;
mod write;

pub use clock::VersionClock;
pub use config::Config;
pub use dir::EngineDir;
pub use engine::{Engine, Transporter};
pub use error::{CoreError, CoreResult};
pub use limbo::{DurableLimbo, InMemoryLimbo, Limbo, Replay};
pub use operator::{matches, Criterion, Operator};
pub use permanent::{IndexedStore, PermanentStore};
pub use search::SearchQuery;
pub use tokens::{Token, TokenRegistry, VersionChangeListener};
pub use transaction::{Transaction, TransactionState};
pub use types::{RecordId, TransactionId, Version};
pub use write::{Action, Key, Write};

pub use tempora_codec::Value;
