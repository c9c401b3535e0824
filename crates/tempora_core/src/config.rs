//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for opening an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether to create the engine directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the buffer log on every insert (safer but slower).
    pub sync_on_insert: bool,

    /// Sync flag handed to the permanent store when transporting.
    pub sync_on_transport: bool,

    /// Most writes a background transporter moves before pausing.
    pub transport_batch_size: usize,

    /// Pause a background transporter takes between batches.
    pub transport_pause: Duration,

    /// How long a background transporter waits on an empty buffer before
    /// checking whether it was asked to stop.
    pub transport_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_insert: true,
            sync_on_transport: true,
            transport_batch_size: 1024,
            transport_pause: Duration::ZERO,
            transport_wait: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync the buffer log on every insert.
    #[must_use]
    pub const fn sync_on_insert(mut self, value: bool) -> Self {
        self.sync_on_insert = value;
        self
    }

    /// Sets the sync flag used when transporting.
    #[must_use]
    pub const fn sync_on_transport(mut self, value: bool) -> Self {
        self.sync_on_transport = value;
        self
    }

    /// Sets the background transport batch size (at least 1).
    #[must_use]
    pub fn transport_batch_size(mut self, size: usize) -> Self {
        self.transport_batch_size = size.max(1);
        self
    }

    /// Sets the pause between background transport batches.
    #[must_use]
    pub const fn transport_pause(mut self, pause: Duration) -> Self {
        self.transport_pause = pause;
        self
    }

    /// Sets how long a transporter blocks on an empty buffer.
    #[must_use]
    pub const fn transport_wait(mut self, wait: Duration) -> Self {
        self.transport_wait = wait;
        self
    }
}
