//! Optimistic transactions.
//!
//! A transaction stages writes in a private in-memory Limbo and answers
//! reads from that overlay on top of the shared engine. Every read and write
//! registers interest in the version tokens it depends on; when any other
//! actor mutates data under one of those tokens the transaction is marked
//! conflicted and its next operation fails with
//! [`crate::CoreError::TransactionConflict`].
//!
//! | operation | token |
//! |-----------|-------|
//! | `select`, `verify`, `audit_key`, `add`, `remove`, `set`, `clear_key`, `verify_and_swap`, `verify_or_set` | `(key, record)` |
//! | `describe`, `select_record`, `audit`, `contains`, `clear_record` | `(record)` |
//! | `browse`, `explore`, `search` | `(key)` |
//!
//! Commit re-stamps the overlay's writes with fresh versions and publishes
//! them into the engine buffer under the engine gate.

mod overlay;
mod state;

pub use overlay::Transaction;
pub use state::TransactionState;
