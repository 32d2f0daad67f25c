//! Composite resources assembled from cached components.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use fussball_cache::CacheFacade;
use fussball_core::{FetchError, Fetcher, Payload, ResourceKey, ResourceKind};

/// Builds `ClubInfo` and `TeamInfo` from their component resources.
///
/// Components are read through the facade, so each one is cached and
/// single-flighted on its own. Every other kind goes straight to the
/// wrapped upstream fetcher.
pub struct CompositeFetcher {
    facade: Arc<CacheFacade>,
    upstream: Arc<dyn Fetcher>,
}

impl CompositeFetcher {
    /// Creates a composite fetcher over `upstream`.
    pub fn new(facade: Arc<CacheFacade>, upstream: Arc<dyn Fetcher>) -> Self {
        Self { facade, upstream }
    }

    /// The fetcher used for component kinds.
    pub fn upstream(&self) -> &Arc<dyn Fetcher> {
        &self.upstream
    }

    /// Reads a component, failing if only a fallback answer is available.
    ///
    /// A composite built from stale parts would otherwise be stored as fresh.
    async fn component(&self, key: ResourceKey) -> Result<Payload, FetchError> {
        let lookup = self.facade.get(&key, &self.upstream).await?;
        match lookup.warning {
            Some(err) => Err(err),
            None if lookup.is_stale() => Err(FetchError::Upstream {
                key,
                reason: "component is stale".into(),
            }),
            None => Ok(lookup.value),
        }
    }

    async fn club_info(&self, club_id: &str) -> Result<Payload, FetchError> {
        let (teams, next_games, prev_games) = tokio::try_join!(
            self.component(ResourceKey::club_teams(club_id)),
            self.component(ResourceKey::club_next_games(club_id)),
            self.component(ResourceKey::club_prev_games(club_id)),
        )?;
        Ok(Arc::new(json!({
            "teams": teams,
            "next_games": next_games,
            "prev_games": prev_games,
        })))
    }

    async fn team_info(&self, team_id: &str) -> Result<Payload, FetchError> {
        let (table, next_games, prev_games) = tokio::try_join!(
            self.component(ResourceKey::team_table(team_id)),
            self.component(ResourceKey::team_next_games(team_id)),
            self.component(ResourceKey::team_prev_games(team_id)),
        )?;
        Ok(Arc::new(json!({
            "table": table,
            "next_games": next_games,
            "prev_games": prev_games,
        })))
    }
}

#[async_trait]
impl Fetcher for CompositeFetcher {
    #[instrument(skip(self), fields(key = %key))]
    async fn fetch(&self, key: &ResourceKey) -> Result<Payload, FetchError> {
        match key.kind {
            ResourceKind::ClubInfo => {
                debug!("Assembling club info");
                self.club_info(&key.id).await
            }
            ResourceKind::TeamInfo => {
                debug!("Assembling team info");
                self.team_info(&key.id).await
            }
            _ => self.upstream.fetch(key).await,
        }
    }
}
