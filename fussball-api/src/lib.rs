//! # fussball API Server
//!
//! Cached read API over fussball.de. Every `/api` route needs the
//! `X-API-Key` header; answers carry `X-Cache-Status: fresh|stale`.
//!
//! ## Endpoints
//!
//! - `GET /api/search/clubs?query=` - Search clubs
//! - `GET /api/club/:club_id` - Club games plus every team with table and games
//! - `GET /api/club/:club_id/{info,teams,next_games,prev_games}`
//! - `GET /api/team/:team_id` - Table, next and previous games of a team
//! - `GET /api/team/:team_id/{table,next_games,prev_games}`
//! - `GET /api/game/:game_id` - Game details
//! - `GET /api/cache/stats` - Cache and prewarm counters
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fussball_api::{ApiConfig, ApiServer, AppState};
//!
//! let state = Arc::new(AppState::new(ApiConfig::from_env()?)?);
//! ApiServer::new(state).run(std::future::pending()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod auth;
mod dto;
mod error;
mod handlers;
mod routes;
mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{ApiConfig, AppState};

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// API server for the fussball cache.
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    /// Creates a server over shared state.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Creates the router with all routes configured.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        create_router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Serves on the configured address until `shutdown` completes.
    pub async fn run<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config.bind;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(%addr, "fussball API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
