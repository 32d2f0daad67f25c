//! Constants shared across the fussball crates.
//!
//! TTL defaults mirror the upstream site's update rhythm: game lists change
//! around match days, tables after each round, team lists a few times a season.

// ═══════════════════════════════════════════════════════════════════════════════
// UPSTREAM
// ═══════════════════════════════════════════════════════════════════════════════

/// Base URL of the upstream site.
pub const FUSSBALL_DE_BASE_URL: &str = "https://www.fussball.de";

/// Default per-request timeout for upstream fetches, in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

/// Default upstream request budget per second.
pub const DEFAULT_UPSTREAM_REQUESTS_PER_SECOND: u32 = 5;

// ═══════════════════════════════════════════════════════════════════════════════
// TTL DEFAULTS (seconds)
// ═══════════════════════════════════════════════════════════════════════════════

/// Game lists, game details and search results.
pub const DEFAULT_TTL_GAMES_SECS: u64 = 900;

/// League tables.
pub const DEFAULT_TTL_TABLE_SECS: u64 = 3600;

/// Club team lists.
pub const DEFAULT_TTL_TEAMS_SECS: u64 = 7200;

/// Upper bound for remembering a "not found" answer from upstream.
pub const NEGATIVE_TTL_CAP_SECS: u64 = 300;

// ═══════════════════════════════════════════════════════════════════════════════
// PREWARMING & PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

/// Default look-ahead margin for proactive refreshes, in seconds.
pub const DEFAULT_PREWARM_LOOKAHEAD_SECS: u64 = 60;

/// Default number of concurrent refreshes within one prewarm cycle.
pub const DEFAULT_PREWARM_CONCURRENCY: usize = 5;

/// Shortest allowed prewarm cadence, in seconds.
pub const MIN_PREWARM_CADENCE_SECS: u64 = 1;

/// Default directory for the cache snapshot.
pub const DEFAULT_CACHE_DIR: &str = "./cache_payloads";

/// File name of the cache snapshot inside the cache directory.
pub const SNAPSHOT_FILE_NAME: &str = "fussball_cache.json";

/// Snapshot files larger than this are ignored at startup.
pub const MAX_SNAPSHOT_BYTES: u64 = 10 * 1024 * 1024;

/// Current snapshot format version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// API
// ═══════════════════════════════════════════════════════════════════════════════

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Minimum length of a club search query.
pub const MIN_SEARCH_QUERY_LEN: usize = 3;
