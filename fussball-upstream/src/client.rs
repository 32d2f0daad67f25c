//! HTTP fetcher for fussball.de.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use fussball_core::constants::{
    DEFAULT_UPSTREAM_REQUESTS_PER_SECOND, DEFAULT_UPSTREAM_TIMEOUT_SECS, FUSSBALL_DE_BASE_URL,
};
use fussball_core::error::{FussballError, Result};
use fussball_core::{FetchError, Fetcher, Payload, ResourceKey, ResourceKind};

use crate::parse;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const USER_AGENT: &str = concat!("fussball-api/", env!("CARGO_PKG_VERSION"));

/// Upstream client configuration.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// Site root, e.g. `https://www.fussball.de`
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
    /// Request budget towards the site
    pub requests_per_second: u32,
}

impl UpstreamConfig {
    /// Configuration for a custom site root.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FussballError::ConfigError(format!("invalid upstream URL {:?}: {}", base_url, e)))?;
        Ok(Self {
            base_url,
            ..Self::default()
        })
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(FUSSBALL_DE_BASE_URL).expect("valid default upstream URL"),
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            requests_per_second: DEFAULT_UPSTREAM_REQUESTS_PER_SECOND,
        }
    }
}

/// Validators of the last page parsed for a key, with its result.
#[derive(Clone)]
struct Revalidation {
    etag: Option<String>,
    last_modified: Option<String>,
    payload: Payload,
}

enum Page {
    Modified {
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    NotModified,
}

/// Fetches and parses fussball.de pages for every non-composite kind.
///
/// Pages served with an `ETag` or `Last-Modified` header are revalidated
/// with a conditional request; a `304` reuses the earlier parse.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
    validators: DashMap<ResourceKey, Revalidation>,
}

impl UpstreamClient {
    /// Creates a client.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FussballError::ConfigError(format!("HTTP client: {}", e)))?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            base_url: config.base_url,
            timeout: config.timeout,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            validators: DashMap::new(),
        })
    }

    /// Page URL of `key`.
    pub fn url_for(&self, key: &ResourceKey) -> std::result::Result<Url, FetchError> {
        let id = key.id.as_str();
        let segments: &[&str] = match key.kind {
            ResourceKind::Search => &["suche", "-", "text", id, "restriction", "CLUB_AND_TEAM"],
            ResourceKind::ClubTeams => &["ajax.club.teams", "-", "action", "search", "id", id],
            ResourceKind::ClubNextGames => &["ajax.club.next.games", "-", "id", id, "mode", "PAGE"],
            ResourceKind::ClubPrevGames => &["ajax.club.prev.games", "-", "id", id, "mode", "PAGE"],
            ResourceKind::TeamTable => &["ajax.team.table", "-", "team-id", id],
            ResourceKind::TeamNextGames => &["ajax.team.next.games", "-", "mode", "PAGE", "team-id", id],
            ResourceKind::TeamPrevGames => &["ajax.team.prev.games", "-", "mode", "PAGE", "team-id", id],
            ResourceKind::GameDetails => &["spiel", "-", "spiel", id],
            ResourceKind::ClubInfo | ResourceKind::TeamInfo => {
                return Err(FetchError::Unsupported(key.clone()))
            }
        };

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Upstream {
                key: key.clone(),
                reason: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn page(
        &self,
        key: &ResourceKey,
        url: Url,
        cached: Option<&Revalidation>,
    ) -> std::result::Result<Page, FetchError> {
        self.limiter.until_ready().await;
        debug!(%url, conditional = cached.is_some(), "Requesting upstream page");

        let mut request = self.http.get(url);
        if let Some(cached) = cached {
            if let Some(etag) = &cached.etag {
                request = request.header(IF_NONE_MATCH, etag.as_str());
            }
            if let Some(last_modified) = &cached.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
            }
        }

        let response = request.send().await.map_err(|e| self.transport_error(key, e))?;

        match response.status() {
            StatusCode::NOT_MODIFIED if cached.is_some() => return Ok(Page::NotModified),
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(FetchError::NotFound(key.clone())),
            status if !status.is_success() => {
                return Err(FetchError::Upstream {
                    key: key.clone(),
                    reason: format!("HTTP {}", status),
                })
            }
            _ => {}
        }

        let etag = header_value(&response, ETAG);
        let last_modified = header_value(&response, LAST_MODIFIED);

        let body = response.text().await.map_err(|e| self.transport_error(key, e))?;
        Ok(Page::Modified {
            body,
            etag,
            last_modified,
        })
    }

    fn transport_error(&self, key: &ResourceKey, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                key: key.clone(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            FetchError::Upstream {
                key: key.clone(),
                reason: e.to_string(),
            }
        }
    }
}

fn header_value(response: &reqwest::Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn to_payload<T: Serialize>(key: &ResourceKey, value: &T) -> std::result::Result<Payload, FetchError> {
    serde_json::to_value(value)
        .map(Arc::new)
        .map_err(|e| FetchError::Malformed {
            key: key.clone(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Fetcher for UpstreamClient {
    #[instrument(skip(self), fields(key = %key))]
    async fn fetch(&self, key: &ResourceKey) -> std::result::Result<Payload, FetchError> {
        let url = self.url_for(key)?;
        let cached = self.validators.get(key).map(|entry| entry.value().clone());

        let (page, etag, last_modified) = match self.page(key, url, cached.as_ref()).await {
            Ok(Page::Modified {
                body,
                etag,
                last_modified,
            }) => (body, etag, last_modified),
            Ok(Page::NotModified) => match cached {
                Some(cached) => {
                    debug!("Upstream page not modified");
                    return Ok(cached.payload);
                }
                None => {
                    return Err(FetchError::Upstream {
                        key: key.clone(),
                        reason: "HTTP 304 without a cached page".into(),
                    })
                }
            },
            Err(err) => {
                if err.is_not_found() {
                    self.validators.remove(key);
                }
                return Err(err);
            }
        };

        let payload = match key.kind {
            ResourceKind::Search => to_payload(key, &parse::search_results(&page))?,
            ResourceKind::ClubTeams => to_payload(key, &parse::club_teams(&page))?,
            ResourceKind::TeamTable => to_payload(key, &parse::team_table(&page))?,
            ResourceKind::ClubNextGames
            | ResourceKind::ClubPrevGames
            | ResourceKind::TeamNextGames
            | ResourceKind::TeamPrevGames => to_payload(key, &parse::games(&page))?,
            ResourceKind::GameDetails => match parse::game_details(&page, &key.id) {
                Some(game) => to_payload(key, &game)?,
                None => {
                    self.validators.remove(key);
                    return Err(FetchError::NotFound(key.clone()));
                }
            },
            ResourceKind::ClubInfo | ResourceKind::TeamInfo => {
                return Err(FetchError::Unsupported(key.clone()))
            }
        };

        debug!(bytes = page.len(), "Parsed upstream page");
        if etag.is_some() || last_modified.is_some() {
            self.validators.insert(
                key.clone(),
                Revalidation {
                    etag,
                    last_modified,
                    payload: payload.clone(),
                },
            );
        } else {
            self.validators.remove(key);
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> UpstreamClient {
        let mut config = UpstreamConfig::with_base_url(&server.uri()).unwrap();
        config.timeout = Duration::from_millis(500);
        config.requests_per_second = 100;
        UpstreamClient::new(config).unwrap()
    }

    #[test]
    fn test_url_mapping() {
        let client = UpstreamClient::new(UpstreamConfig::default()).unwrap();

        let url = client.url_for(&ResourceKey::team_table("T1")).unwrap();
        assert_eq!(url.as_str(), "https://www.fussball.de/ajax.team.table/-/team-id/T1");

        let url = client.url_for(&ResourceKey::club_next_games("C1")).unwrap();
        assert_eq!(url.as_str(), "https://www.fussball.de/ajax.club.next.games/-/id/C1/mode/PAGE");

        let url = client.url_for(&ResourceKey::search("fc köln")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://www.fussball.de/suche/-/text/fc%20k%C3%B6ln/restriction/CLUB_AND_TEAM"
        );

        assert_eq!(
            client.url_for(&ResourceKey::club_info("C1")),
            Err(FetchError::Unsupported(ResourceKey::club_info("C1")))
        );
    }

    #[tokio::test]
    async fn test_fetch_club_teams() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax.club.teams/-/action/search/id/C1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<div class="item"><h4><a href="/mannschaft/herren/-/mannschaft/T1">Herren</a></h4></div>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let payload = client.fetch(&ResourceKey::club_teams("C1")).await.unwrap();
        assert_eq!(
            *payload,
            json!([{ "id": "T1", "name": "Herren", "fussball_de_url": "/mannschaft/herren/-/mannschaft/T1" }])
        );
    }

    #[tokio::test]
    async fn test_team_without_table_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax.team.table/-/team-id/T1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let payload = client.fetch(&ResourceKey::team_table("T1")).await.unwrap();
        assert!(payload.is_null());
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spiel/-/spiel/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/spiel/-/spiel/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let gone = client.fetch(&ResourceKey::game_details("gone")).await.unwrap_err();
        assert!(gone.is_not_found());

        let broken = client.fetch(&ResourceKey::game_details("broken")).await.unwrap_err();
        assert!(matches!(broken, FetchError::Upstream { ref reason, .. } if reason.contains("503")));
    }

    #[tokio::test]
    async fn test_game_page_without_stage_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spiel/-/spiel/G1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.fetch(&ResourceKey::game_details("G1")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_timeout_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.fetch(&ResourceKey::team_next_games("T1")).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_unchanged_page_revalidated_by_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax.team.table/-/team-id/T1"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ajax.team.table/-/team-id/T1"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"v1\"").set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let key = ResourceKey::team_table("T1");
        let first = client.fetch(&key).await.unwrap();
        let second = client.fetch(&key).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_last_modified_sent_back() {
        let server = MockServer::start().await;
        let stamp = "Sat, 25 May 2024 10:00:00 GMT";
        Mock::given(method("GET"))
            .and(path("/ajax.club.teams/-/action/search/id/C1"))
            .and(header("If-Modified-Since", stamp))
            .respond_with(ResponseTemplate::new(304))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ajax.club.teams/-/action/search/id/C1"))
            .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", stamp).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let key = ResourceKey::club_teams("C1");
        client.fetch(&key).await.unwrap();
        assert_eq!(*client.fetch(&key).await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_pages_without_validators_are_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ajax.team.next.games/-/mode/PAGE/team-id/T1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let key = ResourceKey::team_next_games("T1");
        client.fetch(&key).await.unwrap();
        client.fetch(&key).await.unwrap();
        assert!(client.validators.is_empty());
    }
}
