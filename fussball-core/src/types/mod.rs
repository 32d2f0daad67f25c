//! Domain types for fussball.de data.
//!
//! These are the shapes fetchers produce and the HTTP layer serves. The cache
//! itself stores them as opaque JSON payloads.
//!
//! - [`ClubSearchResult`], [`Team`]: club and team identities
//! - [`Table`]: league table of a team
//! - [`Game`]: a single fixture or result
//! - [`ClubInfo`], [`TeamInfo`], [`FullClubInfo`]: composite views

mod club;
mod game;
mod table;

pub use club::*;
pub use game::*;
pub use table::*;
