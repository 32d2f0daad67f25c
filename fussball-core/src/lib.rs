//! # fussball core
//!
//! Core types, errors, and traits shared by every crate of the fussball
//! caching read API.
//!
//! - **Keys**: [`ResourceKey`] and [`ResourceKind`], the identity of a cached resource
//! - **Types**: Domain models for clubs, teams, tables and games
//! - **Errors**: Fetch and crate-level error types
//! - **Traits**: The [`Fetcher`] seam between the cache and the upstream site
//!
//! ## Example
//!
//! ```rust
//! use fussball_core::{ResourceKey, ResourceKind};
//!
//! let key = ResourceKey::team_table("011MIB7A5G000000VTVG0001VTR8C1K7");
//! assert_eq!(key.kind, ResourceKind::TeamTable);
//! assert_eq!(key.to_string(), "team-table:011MIB7A5G000000VTVG0001VTR8C1K7");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod key;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{FetchError, FussballError, Result};
pub use key::{IdKind, Payload, ResourceKey, ResourceKind};
pub use traits::Fetcher;
pub use types::*;
