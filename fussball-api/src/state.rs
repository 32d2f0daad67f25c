//! App state: cache facade, fetchers, background workers, config.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fussball_cache::{CacheConfig, CacheFacade, PersistenceManager, PrewarmScheduler, Store};
use fussball_core::error::{FussballError, Result};
use fussball_core::Fetcher;
use fussball_upstream::{CompositeFetcher, UpstreamClient, UpstreamConfig};

const DEFAULT_API_KEY: &str = "your-secret-api-key";
const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 8000);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Value clients must send in `X-API-Key`
    pub api_key: String,
    /// Listen address
    pub bind: SocketAddr,
    /// Upstream client settings
    pub upstream: UpstreamConfig,
    /// Cache, prewarm and persistence settings
    pub cache: CacheConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.into(),
            bind: DEFAULT_BIND.into(),
            upstream: UpstreamConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut upstream = match var("UPSTREAM_BASE_URL") {
            Some(url) => UpstreamConfig::with_base_url(&url)?,
            None => UpstreamConfig::default(),
        };
        if let Some(raw) = var("UPSTREAM_TIMEOUT_SECONDS") {
            upstream.timeout = Duration::from_secs(positive(&raw, "UPSTREAM_TIMEOUT_SECONDS")?);
        }
        if let Some(raw) = var("UPSTREAM_REQUESTS_PER_SECOND") {
            let rate = positive(&raw, "UPSTREAM_REQUESTS_PER_SECOND")?;
            upstream.requests_per_second = u32::try_from(rate).map_err(|_| {
                FussballError::ConfigError(format!("UPSTREAM_REQUESTS_PER_SECOND out of range: {}", rate))
            })?;
        }

        Ok(Self {
            api_key: var("API_KEY").unwrap_or_else(|| DEFAULT_API_KEY.into()),
            bind: DEFAULT_BIND.into(),
            upstream,
            cache: CacheConfig::from_lookup(&lookup)?,
        })
    }

    /// Overrides the listen address.
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }
}

fn positive(raw: &str, name: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(FussballError::ConfigError(format!(
            "{} must be a positive integer, got {:?}",
            name, raw
        ))),
    }
}

/// Shared state of the request handlers.
pub struct AppState {
    /// Configuration the server was started with
    pub config: ApiConfig,
    /// The cache read path
    pub facade: Arc<CacheFacade>,
    /// Fetcher for every resource kind, composites included
    pub fetcher: Arc<dyn Fetcher>,
    /// Hot club scheduler, when one is configured
    pub scheduler: Option<Arc<PrewarmScheduler>>,
    /// Snapshot writer, unless running memory-only
    pub persistence: Option<Arc<PersistenceManager>>,
    started_at: Instant,
}

impl AppState {
    /// Builds the state with a fussball.de client as upstream.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let upstream = Arc::new(UpstreamClient::new(config.upstream.clone())?);
        Ok(Self::with_upstream(config, upstream))
    }

    /// Builds the state around an arbitrary upstream fetcher.
    pub fn with_upstream(config: ApiConfig, upstream: Arc<dyn Fetcher>) -> Self {
        let store = Arc::new(Store::new());
        let facade = Arc::new(CacheFacade::new(store, config.cache.ttl.clone()));
        let fetcher: Arc<dyn Fetcher> = Arc::new(CompositeFetcher::new(facade.clone(), upstream));

        let persistence = config
            .cache
            .snapshot_path
            .as_ref()
            .map(|path| Arc::new(PersistenceManager::new(path)));
        let scheduler = PrewarmScheduler::from_config(
            facade.clone(),
            fetcher.clone(),
            &config.cache,
            persistence.clone(),
        )
        .map(Arc::new);

        Self {
            config,
            facade,
            fetcher,
            scheduler,
            persistence,
            started_at: Instant::now(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        self.facade.store()
    }

    /// Seconds since the state was built.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_key, DEFAULT_API_KEY);
        assert_eq!(config.bind.port(), 8000);
        assert_eq!(config.upstream.base_url.as_str(), "https://www.fussball.de/");
        assert_eq!(config.upstream.timeout, Duration::from_secs(20));
        assert!(config.cache.hot_entity.is_none());
    }

    #[test]
    fn test_config_overrides() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("API_KEY", "s3cret"),
            ("UPSTREAM_BASE_URL", "http://localhost:9000"),
            ("UPSTREAM_TIMEOUT_SECONDS", "5"),
            ("UPSTREAM_REQUESTS_PER_SECOND", "2"),
            ("PREWARM_CLUB_ID", "C1"),
        ]))
        .unwrap();
        assert_eq!(config.api_key, "s3cret");
        assert_eq!(config.upstream.base_url.as_str(), "http://localhost:9000/");
        assert_eq!(config.upstream.timeout, Duration::from_secs(5));
        assert_eq!(config.upstream.requests_per_second, 2);
        assert_eq!(config.cache.hot_entity.unwrap().club_id, "C1");
    }

    #[test]
    fn test_config_rejects_malformed_numbers() {
        assert!(ApiConfig::from_lookup(lookup(&[("UPSTREAM_TIMEOUT_SECONDS", "soon")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("UPSTREAM_REQUESTS_PER_SECOND", "0")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CACHE_TTL_GAMES", "-1")])).is_err());
    }

    #[test]
    fn test_state_wires_scheduler_only_for_hot_club() {
        let mut config = ApiConfig::default();
        config.cache.snapshot_path = None;
        let state = AppState::new(config.clone()).unwrap();
        assert!(state.scheduler.is_none());
        assert!(state.persistence.is_none());

        config.cache.hot_entity = Some(fussball_cache::HotEntitySpec::club("C1"));
        let state = AppState::new(config).unwrap();
        assert_eq!(state.scheduler.unwrap().spec().club_id, "C1");
    }
}
