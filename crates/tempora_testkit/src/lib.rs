//! # Tempora Testkit
//!
//! Test utilities for Tempora.
//!
//! This crate provides:
//! - Engine fixtures and tracing setup for tests
//! - Property-based test generators using proptest
//! - Scripted permanent stores for transport tests
//! - A crash-simulating storage backend for write log recovery tests
//! - Concurrent transaction stress helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tempora_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_engine() {
//!     with_temp_engine(|engine| {
//!         engine.add("name", "jeff", 1).unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stores;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stores::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use stores::*;
pub use stress::*;
