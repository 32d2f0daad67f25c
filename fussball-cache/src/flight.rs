//! Per-key fetch deduplication.
//!
//! Every fetch runs in its own spawned task and is published as a
//! [`Shared`] future. Callers that miss on a key already being fetched
//! attach to that future instead of calling the fetcher again, so all of
//! them observe the same outcome. Dropping a waiting caller never cancels
//! the fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, error};

use fussball_core::{FetchError, Fetcher, Payload, ResourceKey};

use crate::store::{Freshness, Store};

type FlightResult = Result<Payload, FetchError>;
type SharedFlight = Shared<BoxFuture<'static, FlightResult>>;
type FlightMap = Arc<Mutex<HashMap<ResourceKey, SharedFlight>>>;

/// Collapses concurrent fetches of one key into a single fetcher call.
pub struct SingleFlight {
    store: Arc<Store>,
    flights: FlightMap,
}

impl SingleFlight {
    /// Creates a group writing successful fetches into `store`.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            flights: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The store flights write into.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Number of keys with a fetch in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Returns true if a fetch for `key` is in progress.
    pub fn is_in_flight(&self, key: &ResourceKey) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Fetches `key` unless a flight has just left a fresh entry behind.
    ///
    /// Attaches to a running flight if there is one. Otherwise the store is
    /// checked again under the flight lock, which closes the window between
    /// a caller's miss and a concurrent flight completing.
    pub async fn run(
        &self,
        key: &ResourceKey,
        ttl: Duration,
        fetcher: Arc<dyn Fetcher>,
    ) -> FlightResult {
        self.join_or_start(key, ttl, fetcher, true).await
    }

    /// Fetches `key` even if the stored entry is still fresh.
    ///
    /// A running flight for the key is joined rather than duplicated.
    pub async fn force(
        &self,
        key: &ResourceKey,
        ttl: Duration,
        fetcher: Arc<dyn Fetcher>,
    ) -> FlightResult {
        self.join_or_start(key, ttl, fetcher, false).await
    }

    fn join_or_start(
        &self,
        key: &ResourceKey,
        ttl: Duration,
        fetcher: Arc<dyn Fetcher>,
        reuse_fresh: bool,
    ) -> SharedFlight {
        let mut flights = self.flights.lock();

        if let Some(flight) = flights.get(key) {
            debug!(%key, "Joining in-flight fetch");
            return flight.clone();
        }

        if reuse_fresh {
            if let Some((entry, Freshness::Fresh)) = self.store.lookup(key) {
                debug!(%key, "Fresh entry appeared before flight start");
                return future::ready(Ok(entry.value)).boxed().shared();
            }
        }

        debug!(%key, "Starting fetch");
        let slot = FlightSlot {
            flights: self.flights.clone(),
            key: key.clone(),
        };
        let task = tokio::spawn(fetch_and_store(self.store.clone(), slot, ttl, fetcher));

        let abandoned_key = key.clone();
        let flight = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    error!(key = %abandoned_key, error = %e, "Fetch task failed");
                    Err(FetchError::Abandoned(abandoned_key))
                }
            }
        }
        .boxed()
        .shared();

        flights.insert(key.clone(), flight.clone());
        flight
    }
}

/// Removes the flight's map slot when the fetch task ends, including by panic.
struct FlightSlot {
    flights: FlightMap,
    key: ResourceKey,
}

impl Drop for FlightSlot {
    fn drop(&mut self) {
        self.flights.lock().remove(&self.key);
    }
}

async fn fetch_and_store(
    store: Arc<Store>,
    slot: FlightSlot,
    ttl: Duration,
    fetcher: Arc<dyn Fetcher>,
) -> FlightResult {
    let result = fetcher.fetch(&slot.key).await;
    if let Ok(value) = &result {
        store.put(slot.key.clone(), value.clone(), ttl);
    }
    // The entry is visible before the slot is released.
    drop(slot);
    result
}
