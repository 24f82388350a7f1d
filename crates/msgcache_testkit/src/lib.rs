//! # msgcache Testkit
//!
//! Test utilities for msgcache.
//!
//! This crate provides:
//! - Entry fixtures for the common conversation shapes
//! - A file-backed log store living in a temporary directory
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use msgcache_testkit::prelude::*;
//!
//! let partition = PartitionId::new(7);
//! let pending = text_entry(-1, partition, "hi").with_created_at(0);
//! let echo = confirm(&pending, 501, 900);
//! assert_eq!(echo.content.as_deref(), Some("hi"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use msgcache_core::{Entry, EntryId, EntryKind, EntryStatus, PartitionId};
}

pub use fixtures::*;
pub use generators::*;
