//! Common traits for the fussball crates.
//!
//! These traits define the seams between the cache and its collaborators,
//! so the cache can be driven by the real upstream client or by test doubles.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::key::{Payload, ResourceKey};

// ═══════════════════════════════════════════════════════════════════════════════
// FETCHER TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Produces a fresh value for a resource key.
///
/// Implementations may perform network I/O but must not touch the cache's
/// store directly, and must eventually return (timeouts are the fetcher's
/// responsibility).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches the current value of `key`.
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError>;
}
