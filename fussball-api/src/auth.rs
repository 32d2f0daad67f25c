//! API key check for the `/api` routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use fussball_core::constants::API_KEY_HEADER;

use crate::error::ApiError;
use crate::state::AppState;

/// Rejects requests whose `X-API-Key` header does not match the configured key.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());

    match provided {
        Some(key) if key == state.config.api_key => Ok(next.run(request).await),
        Some(_) => {
            tracing::debug!(path = %request.uri().path(), "Rejected request with wrong API key");
            Err(ApiError::unauthorized("Invalid API Key"))
        }
        None => Err(ApiError::unauthorized("Missing API Key")),
    }
}
