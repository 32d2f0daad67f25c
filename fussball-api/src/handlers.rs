//! API route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use fussball_cache::{Freshness, Lookup};
use fussball_core::constants::MIN_SEARCH_QUERY_LEN;
use fussball_core::{FetchError, FullClubInfo, Game, ResourceKey, Table, Team, TeamWithDetails};

use crate::dto::*;
use crate::error::ApiError;
use crate::state::AppState;

type Result<T> = std::result::Result<T, ApiError>;

/// Serves one resource through the cache.
async fn cached(state: &AppState, key: ResourceKey) -> Result<Lookup> {
    key.validate()?;
    let lookup = state.facade.get(&key, &state.fetcher).await?;
    if let Some(warning) = &lookup.warning {
        debug!(%key, %warning, "Serving cached entry after failed refresh");
    }
    Ok(lookup)
}

fn decode<T: DeserializeOwned>(key: &ResourceKey, lookup: &Lookup) -> Result<T> {
    serde_json::from_value(lookup.value.as_ref().clone()).map_err(|e| {
        ApiError::from(FetchError::Malformed {
            key: key.clone(),
            reason: e.to_string(),
        })
    })
}

/// Freshness of a document assembled from several lookups: stale if any
/// part is, as old as its oldest part.
fn assembled(value: serde_json::Value, parts: &[&Lookup]) -> Lookup {
    let freshness = if parts.iter().any(|p| p.is_stale()) {
        Freshness::Stale
    } else {
        Freshness::Fresh
    };
    let fetched_at = parts
        .iter()
        .map(|p| p.fetched_at)
        .min()
        .unwrap_or_else(chrono::Utc::now);
    let warning = parts.iter().find_map(|p| p.warning.clone());

    Lookup {
        value: Arc::new(value),
        freshness,
        fetched_at,
        warning,
    }
}

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to the Fussball.de API. See /health for status.".into(),
    })
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_seconds: state.uptime().as_secs(),
        cache_entries: state.store().len(),
    })
}

/// GET /api/search/clubs?query=...
pub async fn search_clubs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> Result<CachedJson> {
    if params.query.trim().chars().count() < MIN_SEARCH_QUERY_LEN {
        return Err(ApiError::bad_request(format!(
            "query must be at least {} characters",
            MIN_SEARCH_QUERY_LEN
        )));
    }
    cached(&state, ResourceKey::search(&params.query)).await.map(CachedJson)
}

/// GET /api/club/:club_id
///
/// Club games plus every team with its table and games, in one document.
pub async fn full_club(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
) -> Result<CachedJson> {
    let teams_key = ResourceKey::club_teams(&club_id);
    let teams_lookup = cached(&state, teams_key.clone()).await?;
    let teams: Vec<Team> = decode(&teams_key, &teams_lookup)?;

    let team_details = teams.iter().map(|team| {
        let state = &state;
        async move {
            let table_key = ResourceKey::team_table(&team.id);
            let next_key = ResourceKey::team_next_games(&team.id);
            let prev_key = ResourceKey::team_prev_games(&team.id);
            let (table, next, prev) = tokio::try_join!(
                cached(state, table_key.clone()),
                cached(state, next_key.clone()),
                cached(state, prev_key.clone()),
            )?;
            let details = TeamWithDetails {
                team: team.clone(),
                table: decode::<Option<Table>>(&table_key, &table)?,
                next_games: decode(&next_key, &next)?,
                prev_games: decode(&prev_key, &prev)?,
            };
            Ok::<_, ApiError>((details, [table, next, prev]))
        }
    });

    let next_key = ResourceKey::club_next_games(&club_id);
    let prev_key = ResourceKey::club_prev_games(&club_id);
    let (club_next, club_prev, team_details) = tokio::try_join!(
        cached(&state, next_key.clone()),
        cached(&state, prev_key.clone()),
        try_join_all(team_details),
    )?;

    let club = FullClubInfo {
        club_prev_games: decode::<Vec<Game>>(&prev_key, &club_prev)?,
        club_next_games: decode::<Vec<Game>>(&next_key, &club_next)?,
        teams: team_details.iter().map(|(details, _)| details.clone()).collect(),
    };
    let value = serde_json::to_value(&club).map_err(|e| ApiError::internal(e.to_string()))?;

    let mut parts = vec![&teams_lookup, &club_next, &club_prev];
    parts.extend(team_details.iter().flat_map(|(_, lookups)| lookups.iter()));

    info!(%club_id, teams = club.teams.len(), "Assembled full club view");
    Ok(CachedJson(assembled(value, &parts)))
}

/// GET /api/club/:club_id/info
pub async fn club_info(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::club_info(club_id)).await.map(CachedJson)
}

/// GET /api/club/:club_id/teams
pub async fn club_teams(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::club_teams(club_id)).await.map(CachedJson)
}

/// GET /api/club/:club_id/next_games
pub async fn club_next_games(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::club_next_games(club_id)).await.map(CachedJson)
}

/// GET /api/club/:club_id/prev_games
pub async fn club_prev_games(
    State(state): State<Arc<AppState>>,
    Path(club_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::club_prev_games(club_id)).await.map(CachedJson)
}

/// GET /api/team/:team_id
pub async fn team_info(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::team_info(team_id)).await.map(CachedJson)
}

/// GET /api/team/:team_id/table
pub async fn team_table(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<CachedJson> {
    let lookup = cached(&state, ResourceKey::team_table(team_id)).await?;
    if lookup.value.is_null() {
        return Err(ApiError::not_found("Table not found for this team."));
    }
    Ok(CachedJson(lookup))
}

/// GET /api/team/:team_id/next_games
pub async fn team_next_games(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::team_next_games(team_id)).await.map(CachedJson)
}

/// GET /api/team/:team_id/prev_games
pub async fn team_prev_games(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::team_prev_games(team_id)).await.map(CachedJson)
}

/// GET /api/game/:game_id
pub async fn game_details(
    State(state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<CachedJson> {
    cached(&state, ResourceKey::game_details(game_id)).await.map(CachedJson)
}

/// GET /api/cache/stats
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        cache: state.facade.stats(),
        scheduler: state.scheduler.as_ref().map(|s| s.state()),
        last_cycle: state.scheduler.as_ref().and_then(|s| s.last_report()),
        snapshot_writes: state.persistence.as_ref().map(|p| p.writes()),
    })
}
