//! # fussball upstream
//!
//! Fetchers that feed the cache from fussball.de.
//! [`UpstreamClient`] scrapes single pages; [`CompositeFetcher`] assembles
//! club and team overviews from cached components.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod client;
mod composite;
mod html;
pub mod parse;

pub use client::{UpstreamClient, UpstreamConfig};
pub use composite::CompositeFetcher;
