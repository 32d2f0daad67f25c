//! Per-kind time-to-live policy.

use std::collections::BTreeMap;
use std::time::Duration;

use fussball_core::constants::{
    DEFAULT_TTL_GAMES_SECS, DEFAULT_TTL_TABLE_SECS, DEFAULT_TTL_TEAMS_SECS,
};
use fussball_core::error::{FussballError, Result};
use fussball_core::ResourceKind;

/// TTL for every resource kind.
///
/// A policy can only be built with a non-zero TTL for each kind, so a lookup
/// never falls back to a default that would silently disable caching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtlPolicy {
    ttls: BTreeMap<ResourceKind, Duration>,
}

impl TtlPolicy {
    /// Builds a policy, requiring an entry for every kind.
    pub fn new(ttls: impl IntoIterator<Item = (ResourceKind, Duration)>) -> Result<Self> {
        let ttls: BTreeMap<_, _> = ttls.into_iter().collect();

        let missing: Vec<_> = ResourceKind::ALL
            .iter()
            .filter(|kind| !ttls.contains_key(*kind))
            .map(|kind| kind.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(FussballError::ConfigError(format!(
                "TTL missing for resource kinds: {}",
                missing.join(", ")
            )));
        }

        if let Some((kind, _)) = ttls.iter().find(|(_, ttl)| ttl.is_zero()) {
            return Err(FussballError::ConfigError(format!("TTL for {} must be non-zero", kind)));
        }

        Ok(Self { ttls })
    }

    /// Builds the policy from the three upstream refresh classes.
    ///
    /// Search, game details and composite views follow the games TTL.
    pub fn from_classes(games: Duration, table: Duration, teams: Duration) -> Result<Self> {
        Self::new(ResourceKind::ALL.into_iter().map(|kind| {
            let ttl = match kind {
                ResourceKind::TeamTable => table,
                ResourceKind::ClubTeams => teams,
                _ => games,
            };
            (kind, ttl)
        }))
    }

    /// TTL of `kind`.
    pub fn ttl_for(&self, kind: ResourceKind) -> Duration {
        // Construction guarantees every kind is present.
        self.ttls[&kind]
    }

    /// Returns a copy with one kind's TTL replaced.
    pub fn with_ttl(mut self, kind: ResourceKind, ttl: Duration) -> Result<Self> {
        if ttl.is_zero() {
            return Err(FussballError::ConfigError(format!("TTL for {} must be non-zero", kind)));
        }
        self.ttls.insert(kind, ttl);
        Ok(self)
    }

    /// Shortest TTL among `kinds`, if any.
    pub fn min_ttl<'a>(&self, kinds: impl IntoIterator<Item = &'a ResourceKind>) -> Option<Duration> {
        kinds.into_iter().map(|kind| self.ttl_for(*kind)).min()
    }

    /// Iterates `(kind, ttl)` pairs in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, Duration)> + '_ {
        self.ttls.iter().map(|(kind, ttl)| (*kind, *ttl))
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let ttls = ResourceKind::ALL.into_iter().map(|kind| {
            let secs = match kind {
                ResourceKind::TeamTable => DEFAULT_TTL_TABLE_SECS,
                ResourceKind::ClubTeams => DEFAULT_TTL_TEAMS_SECS,
                _ => DEFAULT_TTL_GAMES_SECS,
            };
            (kind, Duration::from_secs(secs))
        });
        Self { ttls: ttls.collect() }
    }
}
