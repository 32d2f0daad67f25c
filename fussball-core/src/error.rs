//! Error types for the fussball crates.
//!
//! [`FetchError`] is what a fetch can end in. It is `Clone` because one
//! outcome is shared by every caller attached to the same in-flight fetch.
//! [`FussballError`] covers everything else (configuration, persistence, I/O).

use thiserror::Error;

use crate::key::ResourceKey;

/// Result type alias using `FussballError`.
pub type Result<T> = std::result::Result<T, FussballError>;

/// Outcome of a failed upstream fetch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream confirmed the entity does not exist. Never masked by stale data.
    #[error("{0} not found upstream")]
    NotFound(ResourceKey),

    /// Upstream unreachable or answered with an error status.
    #[error("upstream fetch failed for {key}: {reason}")]
    Upstream {
        /// Resource being fetched
        key: ResourceKey,
        /// What went wrong
        reason: String,
    },

    /// Upstream did not answer in time.
    #[error("upstream fetch for {key} timed out after {seconds}s")]
    Timeout {
        /// Resource being fetched
        key: ResourceKey,
        /// Configured timeout
        seconds: u64,
    },

    /// Upstream answered but the document could not be understood.
    #[error("malformed upstream response for {key}: {reason}")]
    Malformed {
        /// Resource being fetched
        key: ResourceKey,
        /// What could not be parsed
        reason: String,
    },

    /// The fetcher has no way to produce this kind of resource.
    #[error("no fetcher for {0}")]
    Unsupported(ResourceKey),

    /// The task running the fetch died before producing an outcome.
    #[error("fetch for {0} was abandoned")]
    Abandoned(ResourceKey),
}

impl FetchError {
    /// The resource this failure is about.
    pub fn key(&self) -> &ResourceKey {
        match self {
            FetchError::NotFound(key)
            | FetchError::Unsupported(key)
            | FetchError::Abandoned(key) => key,
            FetchError::Upstream { key, .. }
            | FetchError::Timeout { key, .. }
            | FetchError::Malformed { key, .. } => key,
        }
    }

    /// Returns true if upstream confirmed the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }

    /// Returns true if retrying later may succeed. Recoverable failures
    /// fall back to stale data when some is cached.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FetchError::Upstream { .. }
                | FetchError::Timeout { .. }
                | FetchError::Malformed { .. }
                | FetchError::Abandoned(_)
        )
    }
}

/// Main error type for everything that is not a fetch outcome.
#[derive(Debug, Error)]
pub enum FussballError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CACHE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// A fetch failed with no cached fallback.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Snapshot could not be written or read.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed resource key or identifier.
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION & STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    // ═══════════════════════════════════════════════════════════════════════════
    // CONFIGURATION & INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FussballError {
    /// Returns true if this is a fetch failure that upstream may recover from.
    pub fn is_recoverable(&self) -> bool {
        match self {
            FussballError::Fetch(err) => err.is_recoverable(),
            _ => false,
        }
    }
}
