//! Transaction lifecycle and conflict detection.

use crate::tokens::{Token, VersionChangeListener};
use parking_lot::Mutex;
use std::fmt;

/// Where a transaction is in its life.
///
/// ```text
/// Unstarted ──first op──► Active ──commit──► Committed
///     │                     │ └──abort────► Aborted
///     └──abort/commit──►    └──conflict───► Conflicted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// No operation yet.
    Unstarted,
    /// At least one operation ran; the overlay may hold writes.
    Active,
    /// Writes were published.
    Committed,
    /// Abandoned by the caller.
    Aborted,
    /// Abandoned because another actor changed data it depends on.
    Conflicted,
}

impl TransactionState {
    /// Whether no further operation can succeed.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted | Self::Conflicted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unstarted => "unstarted",
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
            Self::Conflicted => "conflicted",
        };
        f.write_str(name)
    }
}

/// A transaction's listener: remembers the first token announced to it.
#[derive(Debug, Default)]
pub(crate) struct Watch {
    conflict: Mutex<Option<Token>>,
}

impl Watch {
    /// The first token another actor changed, if any.
    pub(crate) fn conflict(&self) -> Option<Token> {
        self.conflict.lock().clone()
    }
}

impl VersionChangeListener for Watch {
    fn on_version_change(&self, token: &Token) {
        let mut conflict = self.conflict.lock();
        if conflict.is_none() {
            *conflict = Some(token.clone());
        }
    }
}
