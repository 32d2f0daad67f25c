//! API route configuration.

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use crate::auth::require_api_key;
use crate::handlers;
use crate::state::AppState;

/// Creates the API router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // Search
        .route("/api/search/clubs", get(handlers::search_clubs))

        // Clubs
        .route("/api/club/:club_id", get(handlers::full_club))
        .route("/api/club/:club_id/info", get(handlers::club_info))
        .route("/api/club/:club_id/teams", get(handlers::club_teams))
        .route("/api/club/:club_id/next_games", get(handlers::club_next_games))
        .route("/api/club/:club_id/prev_games", get(handlers::club_prev_games))

        // Teams
        .route("/api/team/:team_id", get(handlers::team_info))
        .route("/api/team/:team_id/table", get(handlers::team_table))
        .route("/api/team/:team_id/next_games", get(handlers::team_next_games))
        .route("/api/team/:team_id/prev_games", get(handlers::team_prev_games))

        // Games
        .route("/api/game/:game_id", get(handlers::game_details))

        // Cache
        .route("/api/cache/stats", get(handlers::cache_stats))

        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .merge(api)
        .with_state(state)
}
