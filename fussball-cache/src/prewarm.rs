//! Background refresh of the hot club's resources.
//!
//! Each cycle refreshes the club's team list, derives the dependent key set
//! from it and refreshes every key that would expire before the next cycle
//! ends. Cycles repeat on a cadence derived from the shortest TTL among the
//! dependent kinds until the shutdown signal fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use fussball_core::constants::{
    DEFAULT_PREWARM_CONCURRENCY, DEFAULT_PREWARM_LOOKAHEAD_SECS, MIN_PREWARM_CADENCE_SECS,
};
use fussball_core::{Fetcher, ResourceKey};

use crate::clock::to_chrono;
use crate::config::{CacheConfig, HotEntitySpec};
use crate::facade::{CacheFacade, RefreshOutcome};
use crate::persist::PersistenceManager;

/// Where the scheduler is in its lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    /// Not started
    Idle,
    /// Refreshing keys
    Running {
        /// Cycle number, starting at 1
        cycle: u64,
    },
    /// Waiting for the next cycle
    Sleeping {
        /// Last completed cycle
        cycle: u64,
        /// When the next cycle starts
        until: DateTime<Utc>,
    },
    /// Shut down
    Stopped,
}

/// Summary of one prewarm cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Cycle number
    pub cycle: u64,
    /// Keys fetched successfully
    pub refreshed: usize,
    /// Keys fresh beyond the horizon
    pub skipped: usize,
    /// Keys whose fetch failed
    pub failed: usize,
    /// Whether a snapshot was written after the cycle
    pub snapshot_written: bool,
}

/// Keeps one club's resources fresh independent of request traffic.
pub struct PrewarmScheduler {
    facade: Arc<CacheFacade>,
    fetcher: Arc<dyn Fetcher>,
    spec: HotEntitySpec,
    persistence: Option<Arc<PersistenceManager>>,
    lookahead: Duration,
    interval_cap: Option<Duration>,
    concurrency: usize,
    state: RwLock<SchedulerState>,
    last_report: RwLock<Option<CycleReport>>,
}

impl PrewarmScheduler {
    /// Creates a scheduler for `spec`, refreshing through `fetcher`.
    pub fn new(facade: Arc<CacheFacade>, fetcher: Arc<dyn Fetcher>, spec: HotEntitySpec) -> Self {
        Self {
            facade,
            fetcher,
            spec,
            persistence: None,
            lookahead: Duration::from_secs(DEFAULT_PREWARM_LOOKAHEAD_SECS),
            interval_cap: None,
            concurrency: DEFAULT_PREWARM_CONCURRENCY,
            state: RwLock::new(SchedulerState::Idle),
            last_report: RwLock::new(None),
        }
    }

    /// Builds a scheduler from configuration; `None` when no hot club is set.
    pub fn from_config(
        facade: Arc<CacheFacade>,
        fetcher: Arc<dyn Fetcher>,
        config: &CacheConfig,
        persistence: Option<Arc<PersistenceManager>>,
    ) -> Option<Self> {
        let spec = config.hot_entity.clone()?;
        let mut scheduler = Self::new(facade, fetcher, spec)
            .with_lookahead(config.prewarm_lookahead)
            .with_concurrency(config.prewarm_concurrency);
        scheduler.interval_cap = config.prewarm_interval;
        scheduler.persistence = persistence;
        Some(scheduler)
    }

    /// Writes a snapshot through `persistence` after every cycle.
    pub fn with_persistence(mut self, persistence: Arc<PersistenceManager>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Sets the refresh-ahead margin.
    pub fn with_lookahead(mut self, lookahead: Duration) -> Self {
        self.lookahead = lookahead;
        self
    }

    /// Caps the derived cadence.
    pub fn with_interval_cap(mut self, cap: Duration) -> Self {
        self.interval_cap = Some(cap);
        self
    }

    /// Sets the number of parallel refreshes per cycle (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The hot club being kept warm.
    pub fn spec(&self) -> &HotEntitySpec {
        &self.spec
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        self.state.read().clone()
    }

    /// Report of the most recent completed cycle.
    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().clone()
    }

    /// Time between cycle starts.
    ///
    /// The shortest dependent TTL minus the look-ahead, or half that TTL
    /// when the look-ahead is not shorter than it.
    pub fn cadence(&self) -> Duration {
        let policy = self.facade.policy();
        let min_ttl = policy
            .min_ttl(&self.spec.dependent_kinds())
            .unwrap_or_else(|| policy.ttl_for(fussball_core::ResourceKind::ClubTeams));

        let derived = if min_ttl > self.lookahead {
            min_ttl - self.lookahead
        } else {
            min_ttl / 2
        };
        let derived = derived.max(Duration::from_secs(MIN_PREWARM_CADENCE_SECS));

        match self.interval_cap {
            Some(cap) => derived.min(cap),
            None => derived,
        }
    }

    /// Entries expiring within this window are refreshed.
    fn horizon(&self) -> Duration {
        self.cadence() + self.lookahead
    }

    /// Runs one cycle and writes a snapshot afterwards.
    ///
    /// Per-key failures are counted and never abort the cycle.
    #[instrument(skip(self), fields(club = %self.spec.club_id))]
    pub async fn run_cycle(&self, cycle: u64) -> CycleReport {
        *self.state.write() = SchedulerState::Running { cycle };
        let mut report = CycleReport { cycle, ..Default::default() };

        let teams_key = self.spec.teams_key();
        let team_ids = match self.facade.refresh(&teams_key, &self.fetcher).await {
            Ok(lookup) => {
                if let Some(err) = &lookup.warning {
                    warn!(key = %teams_key, error = %err, "Team list refresh failed, using cached list");
                    report.failed += 1;
                } else {
                    report.refreshed += 1;
                }
                team_ids(&lookup.value)
            }
            Err(err) => {
                warn!(key = %teams_key, error = %err, "Team list unavailable");
                report.failed += 1;
                Vec::new()
            }
        };
        debug!(teams = team_ids.len(), "Derived dependent keys");

        let keys = self.spec.keys_for_teams(&team_ids);
        let (components, composites): (Vec<_>, Vec<_>) =
            keys.into_iter().partition(|key| !key.kind.is_composite());

        let horizon = self.horizon();
        for phase in [components, composites] {
            let outcomes: Vec<(ResourceKey, RefreshOutcome)> = stream::iter(phase)
                .map(|key| async move {
                    let outcome = self.facade.refresh_ahead(&key, &self.fetcher, horizon).await;
                    (key, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (key, outcome) in outcomes {
                match outcome {
                    RefreshOutcome::Refreshed => report.refreshed += 1,
                    RefreshOutcome::Skipped => report.skipped += 1,
                    RefreshOutcome::Failed(err) => {
                        warn!(%key, error = %err, "Prewarm refresh failed");
                        report.failed += 1;
                    }
                }
            }
        }

        if let Some(persistence) = &self.persistence {
            match persistence.save_store(self.facade.store()).await {
                Ok(()) => report.snapshot_written = true,
                Err(e) => warn!(error = %e, "Snapshot after prewarm cycle failed"),
            }
        }

        info!(
            cycle,
            refreshed = report.refreshed,
            skipped = report.skipped,
            failed = report.failed,
            "Prewarm cycle complete"
        );
        *self.last_report.write() = Some(report.clone());
        report
    }

    /// Runs cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// A cycle in progress at shutdown is abandoned; fetches it started
    /// keep running to completion.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            club = %self.spec.club_id,
            cadence_secs = self.cadence().as_secs(),
            "Prewarm scheduler started"
        );

        let mut cycle = 0;
        while !*shutdown.borrow() {
            cycle += 1;
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = self.run_cycle(cycle) => {}
            }

            let cadence = self.cadence();
            let until = self.facade.store().now() + to_chrono(cadence);
            *self.state.write() = SchedulerState::Sleeping { cycle, until };

            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(cadence) => {}
            }
        }

        *self.state.write() = SchedulerState::Stopped;
        info!(cycles = cycle, "Prewarm scheduler stopped");
    }
}

/// Team ids listed in a club-teams payload.
fn team_ids(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|teams| {
            teams
                .iter()
                .filter_map(|team| team.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
