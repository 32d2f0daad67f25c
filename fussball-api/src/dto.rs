//! DTOs for API requests and responses.

use axum::{
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use fussball_cache::{CacheStats, CycleReport, Lookup, SchedulerState};

/// Header telling clients whether the body came from a fresh entry.
pub const X_CACHE_STATUS: &str = "x-cache-status";

const STALE_WARNING: &str = "110 - \"Response is Stale\"";

/// Response for `GET /`.
#[derive(Debug, Serialize)]
pub struct RootResponse {
    /// Greeting
    pub message: String,
}

/// Response for `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Entries held by the cache
    pub cache_entries: usize,
}

/// Query of the club search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search text, at least three characters
    pub query: String,
}

/// Response for `GET /api/cache/stats`.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    /// Store and flight counters
    #[serde(flatten)]
    pub cache: CacheStats,
    /// Prewarm scheduler state, when one runs
    pub scheduler: Option<SchedulerState>,
    /// Outcome of the last prewarm cycle
    pub last_cycle: Option<CycleReport>,
    /// Snapshots written since startup
    pub snapshot_writes: Option<u64>,
}

/// A cached document, sent with its cache status headers.
#[derive(Debug)]
pub struct CachedJson(pub Lookup);

impl IntoResponse for CachedJson {
    fn into_response(self) -> Response {
        let lookup = self.0;
        let mut response = Json(lookup.value).into_response();
        let headers = response.headers_mut();

        let status = HeaderName::from_static(X_CACHE_STATUS);
        if lookup.freshness.is_stale() {
            headers.insert(status, HeaderValue::from_static("stale"));
            headers.insert(header::WARNING, HeaderValue::from_static(STALE_WARNING));
        } else {
            headers.insert(status, HeaderValue::from_static("fresh"));
        }
        let http_date = lookup.fetched_at.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(header::LAST_MODIFIED, value);
        }

        response
    }
}
