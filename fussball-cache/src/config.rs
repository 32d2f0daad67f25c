//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use fussball_core::constants::{
    DEFAULT_CACHE_DIR, DEFAULT_PREWARM_CONCURRENCY, DEFAULT_PREWARM_LOOKAHEAD_SECS,
    DEFAULT_TTL_GAMES_SECS, DEFAULT_TTL_TABLE_SECS, DEFAULT_TTL_TEAMS_SECS, SNAPSHOT_FILE_NAME,
};
use fussball_core::error::{FussballError, Result};
use fussball_core::{ResourceKey, ResourceKind};

use crate::policy::TtlPolicy;

/// The club kept warm by the prewarm scheduler, and which of its
/// resources to refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotEntitySpec {
    /// Club identifier
    pub club_id: String,
    /// Club-level kinds refreshed besides the team list
    pub club_kinds: Vec<ResourceKind>,
    /// Kinds refreshed for every team of the club
    pub team_kinds: Vec<ResourceKind>,
}

impl HotEntitySpec {
    /// Hot club with the default dependent kinds.
    pub fn club(club_id: impl Into<String>) -> Self {
        Self {
            club_id: club_id.into(),
            club_kinds: vec![
                ResourceKind::ClubNextGames,
                ResourceKind::ClubPrevGames,
                ResourceKind::ClubInfo,
            ],
            team_kinds: vec![
                ResourceKind::TeamTable,
                ResourceKind::TeamNextGames,
                ResourceKind::TeamPrevGames,
                ResourceKind::TeamInfo,
            ],
        }
    }

    /// Replaces the club-level kinds.
    pub fn with_club_kinds(mut self, kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.club_kinds = kinds.into_iter().collect();
        self
    }

    /// Replaces the per-team kinds.
    pub fn with_team_kinds(mut self, kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.team_kinds = kinds.into_iter().collect();
        self
    }

    /// The key listing the club's teams.
    pub fn teams_key(&self) -> ResourceKey {
        ResourceKey::club_teams(&self.club_id)
    }

    /// Every kind in the dependent key set, team list included.
    pub fn dependent_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds = vec![ResourceKind::ClubTeams];
        for kind in self.club_kinds.iter().chain(&self.team_kinds) {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    /// Dependent keys besides the team list, given the club's team ids.
    ///
    /// Components come before composites.
    pub fn keys_for_teams(&self, team_ids: &[String]) -> Vec<ResourceKey> {
        let club = self
            .club_kinds
            .iter()
            .filter(|kind| **kind != ResourceKind::ClubTeams)
            .map(|kind| ResourceKey::new(*kind, &self.club_id));
        let teams = team_ids.iter().flat_map(|team_id| {
            self.team_kinds
                .iter()
                .map(move |kind| ResourceKey::new(*kind, team_id))
        });

        let mut keys: Vec<_> = club.chain(teams).collect();
        keys.sort_by_key(|key| key.kind.is_composite());
        keys.dedup();
        keys
    }
}

/// Configuration of the cache, its scheduler and its persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheConfig {
    /// TTL per resource kind
    pub ttl: TtlPolicy,
    /// Club kept warm in the background; `None` disables prewarming
    pub hot_entity: Option<HotEntitySpec>,
    /// Snapshot file; `None` keeps the cache memory-only
    pub snapshot_path: Option<PathBuf>,
    /// Upper bound on the derived prewarm cadence
    pub prewarm_interval: Option<Duration>,
    /// How far ahead of expiry entries are refreshed
    pub prewarm_lookahead: Duration,
    /// Parallel refreshes within one prewarm cycle
    pub prewarm_concurrency: usize,
    /// Periodic snapshot writes besides the per-cycle ones
    pub snapshot_interval: Option<Duration>,
    /// Entries stale for longer are purged on periodic snapshots
    pub stale_retention: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            hot_entity: None,
            snapshot_path: Some(PathBuf::from(DEFAULT_CACHE_DIR).join(SNAPSHOT_FILE_NAME)),
            prewarm_interval: None,
            prewarm_lookahead: Duration::from_secs(DEFAULT_PREWARM_LOOKAHEAD_SECS),
            prewarm_concurrency: DEFAULT_PREWARM_CONCURRENCY,
            snapshot_interval: None,
            stale_retention: None,
        }
    }
}

impl CacheConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let games = secs(&var, "CACHE_TTL_GAMES")?.unwrap_or(Duration::from_secs(DEFAULT_TTL_GAMES_SECS));
        let table = secs(&var, "CACHE_TTL_TABLE")?.unwrap_or(Duration::from_secs(DEFAULT_TTL_TABLE_SECS));
        let teams = secs(&var, "CACHE_TTL_TEAMS")?.unwrap_or(Duration::from_secs(DEFAULT_TTL_TEAMS_SECS));
        let mut ttl = TtlPolicy::from_classes(games, table, teams)?;
        if let Some(search) = secs(&var, "CACHE_TTL_SEARCH")? {
            ttl = ttl.with_ttl(ResourceKind::Search, search)?;
        }
        if let Some(info) = secs(&var, "CACHE_TTL_INFO")? {
            ttl = ttl
                .with_ttl(ResourceKind::ClubInfo, info)?
                .with_ttl(ResourceKind::TeamInfo, info)?;
        }

        let snapshot_path = if flag(&var, "CACHE_PERSISTENCE", true) {
            Some(match var("CACHE_SNAPSHOT_FILE") {
                Some(file) => PathBuf::from(file),
                None => PathBuf::from(var("CACHE_DIR").unwrap_or_else(|| DEFAULT_CACHE_DIR.into()))
                    .join(SNAPSHOT_FILE_NAME),
            })
        } else {
            None
        };

        let prewarm_concurrency = match var("PREWARM_CONCURRENCY") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(FussballError::ConfigError(format!(
                        "PREWARM_CONCURRENCY must be a positive integer, got {:?}",
                        raw
                    )))
                }
            },
            None => DEFAULT_PREWARM_CONCURRENCY,
        };

        Ok(Self {
            ttl,
            hot_entity: var("PREWARM_CLUB_ID").map(HotEntitySpec::club),
            snapshot_path,
            prewarm_interval: secs(&var, "PREWARM_INTERVAL_SECONDS")?,
            prewarm_lookahead: secs_allow_zero(&var, "PREWARM_LOOKAHEAD_SECONDS")?
                .unwrap_or(Duration::from_secs(DEFAULT_PREWARM_LOOKAHEAD_SECS)),
            prewarm_concurrency,
            snapshot_interval: secs(&var, "SNAPSHOT_INTERVAL_SECONDS")?,
            stale_retention: secs_allow_zero(&var, "CACHE_STALE_RETENTION_SECONDS")?,
        })
    }
}

fn parse_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse().map_err(|_| {
        FussballError::ConfigError(format!("{} must be a number of seconds, got {:?}", name, raw))
    })
}

fn secs_allow_zero(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<Duration>> {
    var(name)
        .map(|raw| parse_u64(name, &raw).map(Duration::from_secs))
        .transpose()
}

fn secs(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<Duration>> {
    match secs_allow_zero(var, name)? {
        Some(d) if d.is_zero() => Err(FussballError::ConfigError(format!("{} must be positive", name))),
        other => Ok(other),
    }
}

fn flag(var: &impl Fn(&str) -> Option<String>, name: &str, default: bool) -> bool {
    var(name)
        .map(|v| v != "false" && v != "0")
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_from_empty_env() {
        let config = CacheConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("./cache_payloads/fussball_cache.json"))
        );
    }

    #[test]
    fn test_env_overrides() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("CACHE_TTL_GAMES", "120"),
            ("CACHE_TTL_INFO", "60"),
            ("PREWARM_CLUB_ID", " 00ES8GN "),
            ("PREWARM_LOOKAHEAD_SECONDS", "0"),
            ("PREWARM_CONCURRENCY", "2"),
            ("CACHE_DIR", "/var/cache/fussball"),
        ]))
        .unwrap();

        assert_eq!(config.ttl.ttl_for(ResourceKind::TeamNextGames), Duration::from_secs(120));
        assert_eq!(config.ttl.ttl_for(ResourceKind::ClubInfo), Duration::from_secs(60));
        assert_eq!(config.ttl.ttl_for(ResourceKind::TeamTable), Duration::from_secs(3600));
        assert_eq!(config.hot_entity.unwrap().club_id, "00ES8GN");
        assert_eq!(config.prewarm_lookahead, Duration::ZERO);
        assert_eq!(config.prewarm_concurrency, 2);
        assert_eq!(
            config.snapshot_path,
            Some(PathBuf::from("/var/cache/fussball/fussball_cache.json"))
        );
    }

    #[test]
    fn test_persistence_disabled() {
        let config = CacheConfig::from_lookup(lookup(&[("CACHE_PERSISTENCE", "false")])).unwrap();
        assert!(config.snapshot_path.is_none());
    }

    #[test]
    fn test_malformed_numbers_rejected() {
        assert!(CacheConfig::from_lookup(lookup(&[("CACHE_TTL_TABLE", "soon")])).is_err());
        assert!(CacheConfig::from_lookup(lookup(&[("CACHE_TTL_TEAMS", "0")])).is_err());
        assert!(CacheConfig::from_lookup(lookup(&[("PREWARM_CONCURRENCY", "0")])).is_err());
        assert!(CacheConfig::from_lookup(lookup(&[("PREWARM_INTERVAL_SECONDS", "-5")])).is_err());
    }

    #[test]
    fn test_hot_entity_keys() {
        let spec = HotEntitySpec::club("C")
            .with_club_kinds([ResourceKind::ClubInfo])
            .with_team_kinds([ResourceKind::TeamTable]);
        let keys = spec.keys_for_teams(&["T1".to_string(), "T2".to_string()]);

        assert_eq!(
            keys,
            vec![
                ResourceKey::team_table("T1"),
                ResourceKey::team_table("T2"),
                ResourceKey::club_info("C"),
            ]
        );
        assert_eq!(
            spec.dependent_kinds(),
            vec![ResourceKind::ClubTeams, ResourceKind::ClubInfo, ResourceKind::TeamTable]
        );
    }
}
