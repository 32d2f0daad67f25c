//! Self-refreshing resource cache for the fussball API.
//!
//! - [`Store`]: keyed entries with TTL freshness, snapshot and restore
//! - [`SingleFlight`]: one upstream fetch per key at a time
//! - [`CacheFacade`]: the read path, serving stale data when upstream fails
//! - [`PrewarmScheduler`]: keeps one club's resources fresh in the background
//! - [`PersistenceManager`]: atomic JSON snapshots across restarts
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fussball_cache::{CacheFacade, Store, TtlPolicy};
//! use fussball_core::ResourceKey;
//!
//! let store = Arc::new(Store::new());
//! let facade = CacheFacade::new(store.clone(), TtlPolicy::default());
//!
//! let key = ResourceKey::team_table("T1");
//! store.put(key.clone(), Arc::new(serde_json::json!(null)), Duration::from_secs(60));
//! assert!(!facade.peek(&key).unwrap().is_stale());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

mod clock;
mod config;
mod facade;
mod flight;
pub mod persist;
mod policy;
mod prewarm;
mod store;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, HotEntitySpec};
pub use facade::{CacheFacade, CacheStats, Lookup, RefreshOutcome};
pub use flight::SingleFlight;
pub use persist::PersistenceManager;
pub use policy::TtlPolicy;
pub use prewarm::{CycleReport, PrewarmScheduler, SchedulerState};
pub use store::{Entry, Freshness, RestoreReport, Snapshot, Store, StoreStats};
