//! Version assignment.

use crate::types::Version;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Hands out strictly increasing versions.
///
/// Each version is the current wall clock in microseconds, or one past the
/// previous version when the clock has not advanced (or went backwards).
#[derive(Debug, Default)]
pub struct VersionClock {
    last: Mutex<u64>,
}

impl VersionClock {
    /// Creates a clock with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose next version is after `floor`.
    #[must_use]
    pub fn starting_after(floor: Version) -> Self {
        Self {
            last: Mutex::new(floor.as_u64()),
        }
    }

    /// Returns the next version.
    pub fn next(&self) -> Version {
        let mut last = self.last.lock();
        let now = now_micros();
        *last = now.max(last.saturating_add(1));
        Version::new(*last)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
