//! Keyed entry storage with TTL semantics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use fussball_core::{Payload, ResourceKey};

use crate::clock::{to_chrono, Clock, SystemClock};

/// Whether an entry is still within its TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// `now - fetched_at < ttl`
    Fresh,
    /// Past its TTL but kept for fallback
    Stale,
}

impl Freshness {
    /// Returns true for [`Freshness::Stale`].
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale)
    }
}

/// A cached value with its freshness metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// The cached document
    pub value: Payload,
    /// When the value was fetched; never moves backwards for a key
    pub fetched_at: DateTime<Utc>,
    /// How long the value counts as fresh
    pub ttl: Duration,
}

impl Entry {
    /// Freshness at `now`.
    pub fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        if now.signed_duration_since(self.fetched_at) < to_chrono(self.ttl) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    /// Time left until the entry goes stale; zero once it has.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let age = now.signed_duration_since(self.fetched_at);
        (to_chrono(self.ttl) - age).to_std().unwrap_or(Duration::ZERO)
    }

    /// How long ago the entry went stale; `None` while fresh.
    fn expired_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        let over = now.signed_duration_since(self.fetched_at) - to_chrono(self.ttl);
        over.to_std().ok()
    }
}

/// Point-in-time copy of the whole store, ordered by key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    /// Entries, in ascending key order when taken from a store
    pub entries: Vec<(ResourceKey, Entry)>,
}

impl Snapshot {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of [`Store::restore`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entries taken from the snapshot
    pub loaded: usize,
    /// Loaded entries that were already past their TTL
    pub stale: usize,
    /// Entries ignored because the store held a newer fetch
    pub skipped: usize,
}

/// Store statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Total entries (fresh and stale)
    pub total: usize,
    /// Entries within their TTL
    pub fresh: usize,
    /// Entries past their TTL
    pub stale: usize,
}

/// Thread-safe keyed storage for cache entries.
///
/// One lock guards the map: readers share it, writers and snapshot
/// iteration serialize on it. Nothing here performs I/O.
pub struct Store {
    entries: RwLock<BTreeMap<ResourceKey, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Store {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Current time on the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns a copy of the entry for `key`, fresh or stale.
    pub fn get(&self, key: &ResourceKey) -> Option<Entry> {
        self.entries.read().get(key).cloned()
    }

    /// Returns the entry for `key` together with its current freshness.
    pub fn lookup(&self, key: &ResourceKey) -> Option<(Entry, Freshness)> {
        let now = self.clock.now();
        self.get(key).map(|entry| {
            let freshness = entry.freshness(now);
            (entry, freshness)
        })
    }

    /// Inserts or overwrites the entry for `key`, stamped with the current time.
    ///
    /// Concurrent puts on one key are applied in lock order; the last one
    /// wins. The stored `fetched_at` never moves backwards, even if the clock does.
    pub fn put(&self, key: ResourceKey, value: Payload, ttl: Duration) -> Entry {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let fetched_at = match entries.get(&key) {
            Some(existing) if existing.fetched_at > now => existing.fetched_at,
            _ => now,
        };
        let entry = Entry { value, fetched_at, ttl };
        entries.insert(key, entry.clone());
        entry
    }

    /// Removes the entry for `key`.
    pub fn remove(&self, key: &ResourceKey) -> Option<Entry> {
        self.entries.write().remove(key)
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Removes entries that have been stale for longer than `retention`.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self, retention: Duration) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.expired_for(now).map_or(true, |over| over <= retention));
        before - entries.len()
    }

    /// Consistent copy of every entry, taken under the store lock.
    pub fn snapshot(&self) -> Snapshot {
        let entries = self.entries.read();
        Snapshot {
            entries: entries.iter().map(|(k, e)| (k.clone(), e.clone())).collect(),
        }
    }

    /// Bulk-loads a snapshot.
    ///
    /// Expired entries are loaded too (they serve as stale fallback). An
    /// entry is skipped when the store already holds a fetch at least as recent.
    pub fn restore(&self, snapshot: Snapshot) -> RestoreReport {
        let now = self.clock.now();
        let mut report = RestoreReport::default();
        let mut entries = self.entries.write();

        for (key, entry) in snapshot.entries {
            if let Some(existing) = entries.get(&key) {
                if existing.fetched_at >= entry.fetched_at {
                    report.skipped += 1;
                    continue;
                }
            }
            if entry.freshness(now).is_stale() {
                report.stale += 1;
            }
            report.loaded += 1;
            entries.insert(key, entry);
        }

        report
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StoreStats {
        let now = self.clock.now();
        let entries = self.entries.read();
        let stale = entries.values().filter(|e| e.freshness(now).is_stale()).count();

        StoreStats {
            total: entries.len(),
            fresh: entries.len() - stale,
            stale,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn payload(v: serde_json::Value) -> Payload {
        Arc::new(v)
    }

    fn manual_store() -> (Arc<ManualClock>, Store) {
        let clock = Arc::new(ManualClock::default());
        let store = Store::with_clock(clock.clone());
        (clock, store)
    }

    #[test]
    fn test_store_put_get() {
        let store = Store::new();
        let key = ResourceKey::club_teams("C1");
        store.put(key.clone(), payload(json!(["a"])), Duration::from_secs(60));

        let entry = store.get(&key).unwrap();
        assert_eq!(*entry.value, json!(["a"]));
        assert_eq!(entry.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_store_miss() {
        let store = Store::new();
        assert!(store.get(&ResourceKey::club_teams("nope")).is_none());
        assert!(store.lookup(&ResourceKey::club_teams("nope")).is_none());
    }

    #[test]
    fn test_store_freshness_follows_ttl() {
        let (clock, store) = manual_store();
        let key = ResourceKey::club_info("C1");
        store.put(key.clone(), payload(json!(1)), Duration::from_secs(60));

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.lookup(&key).unwrap().1, Freshness::Fresh);

        clock.advance(Duration::from_secs(30));
        assert_eq!(store.lookup(&key).unwrap().1, Freshness::Stale);

        // Stale entries are kept.
        clock.advance(Duration::from_secs(3600));
        assert_eq!(*store.get(&key).unwrap().value, json!(1));
    }

    #[test]
    fn test_store_last_writer_wins() {
        let store = Store::new();
        let key = ResourceKey::team_table("T1");
        store.put(key.clone(), payload(json!("first")), Duration::from_secs(60));
        store.put(key.clone(), payload(json!("second")), Duration::from_secs(60));
        assert_eq!(*store.get(&key).unwrap().value, json!("second"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_fetched_at_never_regresses() {
        let (clock, store) = manual_store();
        let key = ResourceKey::team_table("T1");
        let later = clock.now() + chrono::Duration::seconds(100);

        clock.set(later);
        store.put(key.clone(), payload(json!(1)), Duration::from_secs(60));

        clock.set(later - chrono::Duration::seconds(50));
        let entry = store.put(key.clone(), payload(json!(2)), Duration::from_secs(60));

        assert_eq!(entry.fetched_at, later);
        assert_eq!(*store.get(&key).unwrap().value, json!(2));
    }

    #[test]
    fn test_remaining() {
        let (clock, store) = manual_store();
        let key = ResourceKey::search("test");
        let entry = store.put(key, payload(json!([])), Duration::from_secs(60));

        clock.advance(Duration::from_secs(45));
        assert_eq!(entry.remaining(clock.now()), Duration::from_secs(15));
        clock.advance(Duration::from_secs(45));
        assert_eq!(entry.remaining(clock.now()), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let store = Store::new();
        store.put(ResourceKey::team_table("B"), payload(json!(2)), Duration::from_secs(60));
        store.put(ResourceKey::club_teams("A"), payload(json!(1)), Duration::from_secs(60));
        store.put(ResourceKey::team_table("A"), payload(json!(3)), Duration::from_secs(60));

        let snapshot = store.snapshot();
        let keys: Vec<_> = snapshot.entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![
                ResourceKey::club_teams("A"),
                ResourceKey::team_table("A"),
                ResourceKey::team_table("B"),
            ]
        );

        // Later writes do not affect a taken snapshot.
        store.put(ResourceKey::team_table("A"), payload(json!(99)), Duration::from_secs(60));
        assert_eq!(*snapshot.entries[1].1.value, json!(3));
    }

    #[test]
    fn test_restore_loads_expired_as_stale() {
        let (clock, source) = manual_store();
        source.put(ResourceKey::club_info("C1"), payload(json!("old")), Duration::from_secs(60));
        source.put(ResourceKey::club_teams("C1"), payload(json!("new")), Duration::from_secs(7200));
        let snapshot = source.snapshot();

        clock.advance(Duration::from_secs(120));
        let target = Store::with_clock(clock.clone());
        let report = target.restore(snapshot);

        assert_eq!(report, RestoreReport { loaded: 2, stale: 1, skipped: 0 });
        assert_eq!(target.lookup(&ResourceKey::club_info("C1")).unwrap().1, Freshness::Stale);
        assert_eq!(target.lookup(&ResourceKey::club_teams("C1")).unwrap().1, Freshness::Fresh);
    }

    #[test]
    fn test_restore_keeps_newer_entry() {
        let (clock, store) = manual_store();
        let key = ResourceKey::team_table("T1");
        store.put(key.clone(), payload(json!("old")), Duration::from_secs(60));
        let old_snapshot = store.snapshot();

        clock.advance(Duration::from_secs(10));
        store.put(key.clone(), payload(json!("new")), Duration::from_secs(60));

        let report = store.restore(old_snapshot);
        assert_eq!(report.skipped, 1);
        assert_eq!(*store.get(&key).unwrap().value, json!("new"));
    }

    #[test]
    fn test_purge_expired() {
        let (clock, store) = manual_store();
        store.put(ResourceKey::club_info("short"), payload(json!(1)), Duration::from_secs(10));
        store.put(ResourceKey::club_info("long"), payload(json!(2)), Duration::from_secs(1000));

        clock.advance(Duration::from_secs(100));
        assert_eq!(store.purge_expired(Duration::from_secs(120)), 0);
        assert_eq!(store.purge_expired(Duration::from_secs(60)), 1);
        assert!(store.get(&ResourceKey::club_info("long")).is_some());
    }

    #[test]
    fn test_store_remove_and_clear() {
        let store = Store::new();
        store.put(ResourceKey::club_info("a"), payload(json!(1)), Duration::from_secs(10));
        store.put(ResourceKey::club_info("b"), payload(json!(2)), Duration::from_secs(10));

        assert!(store.remove(&ResourceKey::club_info("a")).is_some());
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_stats() {
        let (clock, store) = manual_store();
        store.put(ResourceKey::club_info("a"), payload(json!(1)), Duration::from_secs(10));
        store.put(ResourceKey::club_info("b"), payload(json!(2)), Duration::from_secs(100));
        clock.advance(Duration::from_secs(50));

        assert_eq!(store.stats(), StoreStats { total: 2, fresh: 1, stale: 1 });
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let store = Arc::new(Store::new());
        let key = ResourceKey::team_next_games("T1");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let key = key.clone();
                std::thread::spawn(move || {
                    for j in 0..200 {
                        if i % 2 == 0 {
                            store.put(key.clone(), payload(json!([i, j])), Duration::from_secs(60));
                        } else if let Some(entry) = store.get(&key) {
                            assert!(entry.value.is_array());
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
