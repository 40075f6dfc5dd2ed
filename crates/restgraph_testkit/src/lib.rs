//! # restgraph Testkit
//!
//! Test utilities for restgraph.
//!
//! This crate provides:
//! - A music catalog fixture (artists, songs, albums)
//! - Wire record builders for that catalog
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use restgraph_testkit::prelude::*;
//!
//! #[test]
//! fn decodes_artists() {
//!     let catalog = music_catalog();
//!     let record = artist_record("1", "Nina Simone");
//!     // ... decode and assert
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
