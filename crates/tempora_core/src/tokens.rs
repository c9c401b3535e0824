//! Version tokens and the registry that routes change announcements.
//!
//! A token names something a transaction depends on: one cell
//! `(key, record)`, a whole record, or a whole key. Transactions register
//! interest in tokens as they read and write; every mutation announces the
//! three tokens it touches, and every other transaction registered under
//! one of them is told its view is stale.

use crate::types::{RecordId, TransactionId};
use crate::write::Key;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A value-typed name for a unit of change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    key: Option<Key>,
    record: Option<RecordId>,
}

impl Token {
    /// The token for one `(key, record)` cell.
    pub fn cell(key: impl Into<Key>, record: RecordId) -> Self {
        Self {
            key: Some(key.into()),
            record: Some(record),
        }
    }

    /// The token for a whole record.
    #[must_use]
    pub fn record(record: RecordId) -> Self {
        Self {
            key: None,
            record: Some(record),
        }
    }

    /// The token for a whole key.
    pub fn key(key: impl Into<Key>) -> Self {
        Self {
            key: Some(key.into()),
            record: None,
        }
    }

    /// The key component, if any.
    #[must_use]
    pub fn key_part(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The record component, if any.
    #[must_use]
    pub fn record_part(&self) -> Option<RecordId> {
        self.record
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.key, self.record) {
            (Some(key), Some(record)) => write!(f, "{key} in {record}"),
            (None, Some(record)) => write!(f, "record {record}"),
            (Some(key), None) => write!(f, "key {key}"),
            (None, None) => f.write_str("nothing"),
        }
    }
}

/// Receives announcements for tokens it registered under.
pub trait VersionChangeListener: Send + Sync {
    /// Called when another actor changed data named by `token`.
    ///
    /// Runs on the announcing thread while it holds the engine's mutation
    /// lock, so implementations must only record the fact and return.
    fn on_version_change(&self, token: &Token);
}

/// Concurrent map from token to the listeners interested in it.
///
/// Entries appear on first registration and disappear with their last
/// listener. Unrelated tokens live in different shards, so transactions
/// touching different data never contend here.
#[derive(Default)]
pub struct TokenRegistry {
    listeners: DashMap<Token, HashMap<TransactionId, Arc<dyn VersionChangeListener>>>,
}

impl TokenRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` under `token` on behalf of `owner`.
    ///
    /// Registering the same owner twice keeps a single entry.
    pub fn register(
        &self,
        token: Token,
        owner: TransactionId,
        listener: Arc<dyn VersionChangeListener>,
    ) {
        self.listeners
            .entry(token)
            .or_default()
            .insert(owner, listener);
    }

    /// Removes `owner`'s interest in `token`.
    pub fn unregister(&self, token: &Token, owner: TransactionId) {
        if let Some(mut entry) = self.listeners.get_mut(token) {
            entry.remove(&owner);
        }
        self.listeners.remove_if(token, |_, owners| owners.is_empty());
    }

    /// Tells every listener under `token`, except `source`, that it changed.
    ///
    /// Returns how many listeners were notified.
    pub fn announce(&self, token: &Token, source: Option<TransactionId>) -> usize {
        let targets: Vec<Arc<dyn VersionChangeListener>> = match self.listeners.get(token) {
            Some(owners) => owners
                .iter()
                .filter(|(owner, _)| Some(**owner) != source)
                .map(|(_, listener)| Arc::clone(listener))
                .collect(),
            None => return 0,
        };
        for listener in &targets {
            tracing::trace!(%token, "announcing version change");
            listener.on_version_change(token);
        }
        targets.len()
    }

    /// Whether `owner` is registered under `token`.
    #[must_use]
    pub fn is_registered(&self, token: &Token, owner: TransactionId) -> bool {
        self.listeners
            .get(token)
            .is_some_and(|owners| owners.contains_key(&owner))
    }

    /// Number of tokens with at least one listener.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no token has a listener.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("tokens", &self.listeners.len())
            .finish()
    }
}
