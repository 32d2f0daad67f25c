//! The read API request handlers call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use fussball_core::constants::NEGATIVE_TTL_CAP_SECS;
use fussball_core::{FetchError, Fetcher, Payload, ResourceKey};

use crate::clock::to_chrono;
use crate::flight::SingleFlight;
use crate::policy::TtlPolicy;
use crate::store::{Entry, Freshness, Store, StoreStats};

/// A value served by the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct Lookup {
    /// The cached document
    pub value: Payload,
    /// Whether the value is within its TTL
    pub freshness: Freshness,
    /// When the value was fetched from upstream
    pub fetched_at: DateTime<Utc>,
    /// The failed refresh behind a fallback answer
    pub warning: Option<FetchError>,
}

impl Lookup {
    fn from_entry(entry: Entry, freshness: Freshness) -> Self {
        Self {
            value: entry.value,
            freshness,
            fetched_at: entry.fetched_at,
            warning: None,
        }
    }

    /// Returns true if the value is past its TTL.
    pub fn is_stale(&self) -> bool {
        self.freshness.is_stale()
    }
}

/// Result of a look-ahead refresh.
#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    /// A fetch ran and the store was updated
    Refreshed,
    /// The entry outlives the horizon; nothing was fetched
    Skipped,
    /// The fetch failed; the stored entry is unchanged
    Failed(FetchError),
}

/// Facade statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Store contents
    pub store: StoreStats,
    /// Keys with a fetch in progress
    pub in_flight: usize,
    /// Keys remembered as not found
    pub negative: usize,
}

/// Store, single flight and TTL policy behind one read path.
///
/// A client only gets an error for a resource that was never fetched
/// successfully, or that upstream reports as not found.
pub struct CacheFacade {
    store: Arc<Store>,
    flights: SingleFlight,
    policy: TtlPolicy,
    negative: DashMap<ResourceKey, DateTime<Utc>>,
}

impl CacheFacade {
    /// Creates a facade over `store`.
    pub fn new(store: Arc<Store>, policy: TtlPolicy) -> Self {
        Self {
            flights: SingleFlight::new(store.clone()),
            store,
            policy,
            negative: DashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// The TTL policy.
    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// Facade statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            store: self.store.stats(),
            in_flight: self.flights.in_flight(),
            negative: self.negative.len(),
        }
    }

    /// Reads `key` from the store only.
    pub fn peek(&self, key: &ResourceKey) -> Option<Lookup> {
        self.store
            .lookup(key)
            .map(|(entry, freshness)| Lookup::from_entry(entry, freshness))
    }

    /// Serves `key`, fetching it through `fetcher` on a miss or stale hit.
    ///
    /// A failed fetch falls back to the stale entry with the failure attached
    /// as a warning. `NotFound` is always returned as an error.
    #[instrument(skip(self, fetcher), fields(key = %key))]
    pub async fn get(
        &self,
        key: &ResourceKey,
        fetcher: &Arc<dyn Fetcher>,
    ) -> Result<Lookup, FetchError> {
        if let Some((entry, Freshness::Fresh)) = self.store.lookup(key) {
            debug!("Cache hit");
            return Ok(Lookup::from_entry(entry, Freshness::Fresh));
        }

        if let Some(err) = self.negative_hit(key) {
            debug!("Negative cache hit");
            return Err(err);
        }

        debug!("Cache miss, fetching");
        let ttl = self.policy.ttl_for(key.kind);
        let result = self.flights.run(key, ttl, fetcher.clone()).await;
        self.settle(key, result)
    }

    /// Fetches `key` even if the stored entry is fresh.
    ///
    /// Shares a flight already in progress. Failures fall back the same way
    /// as [`CacheFacade::get`].
    #[instrument(skip(self, fetcher), fields(key = %key))]
    pub async fn refresh(
        &self,
        key: &ResourceKey,
        fetcher: &Arc<dyn Fetcher>,
    ) -> Result<Lookup, FetchError> {
        let ttl = self.policy.ttl_for(key.kind);
        let result = self.flights.force(key, ttl, fetcher.clone()).await;
        self.settle(key, result)
    }

    /// Refreshes `key` unless its entry stays fresh for at least `horizon`.
    pub async fn refresh_ahead(
        &self,
        key: &ResourceKey,
        fetcher: &Arc<dyn Fetcher>,
        horizon: Duration,
    ) -> RefreshOutcome {
        if let Some(entry) = self.store.get(key) {
            if entry.remaining(self.store.now()) >= horizon {
                return RefreshOutcome::Skipped;
            }
        }

        let ttl = self.policy.ttl_for(key.kind);
        match self.flights.force(key, ttl, fetcher.clone()).await {
            Ok(_) => {
                self.negative.remove(key);
                RefreshOutcome::Refreshed
            }
            Err(err) => {
                if err.is_not_found() {
                    self.remember_not_found(key);
                }
                RefreshOutcome::Failed(err)
            }
        }
    }

    fn settle(
        &self,
        key: &ResourceKey,
        result: Result<Payload, FetchError>,
    ) -> Result<Lookup, FetchError> {
        match result {
            Ok(value) => {
                self.negative.remove(key);
                let fetched_at = self
                    .store
                    .get(key)
                    .filter(|entry| Arc::ptr_eq(&entry.value, &value))
                    .map(|entry| entry.fetched_at)
                    .unwrap_or_else(|| self.store.now());
                Ok(Lookup {
                    value,
                    freshness: Freshness::Fresh,
                    fetched_at,
                    warning: None,
                })
            }
            Err(err) if err.is_not_found() => {
                self.remember_not_found(key);
                Err(err)
            }
            Err(err) => match self.store.lookup(key) {
                Some((entry, freshness)) => {
                    warn!(key = %key, error = %err, "Fetch failed, serving cached entry");
                    let mut lookup = Lookup::from_entry(entry, freshness);
                    lookup.warning = Some(err);
                    Ok(lookup)
                }
                None => {
                    warn!(key = %key, error = %err, "Fetch failed with nothing cached");
                    Err(err)
                }
            },
        }
    }

    fn remember_not_found(&self, key: &ResourceKey) {
        let window = self
            .policy
            .ttl_for(key.kind)
            .min(Duration::from_secs(NEGATIVE_TTL_CAP_SECS));
        self.negative
            .insert(key.clone(), self.store.now() + to_chrono(window));
    }

    fn negative_hit(&self, key: &ResourceKey) -> Option<FetchError> {
        let expires = self.negative.get(key).map(|e| *e.value())?;
        if self.store.now() < expires {
            Some(FetchError::NotFound(key.clone()))
        } else {
            self.negative.remove(key);
            None
        }
    }
}
