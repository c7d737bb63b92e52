//! Twitter media-timeline resolver: a cursor-based pagination crawler.
//!
//! The media timeline is paged with opaque continuation cursors. Remote
//! pagination is not trusted to terminate on its own: the crawl stops when
//! the next cursor is empty, equals the cursor just used, or was already
//! consumed earlier in the crawl. Items are deduplicated by tweet id across
//! the whole crawl, and a page-fetch error preserves everything accumulated
//! so far instead of discarding it.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{CredentialStore, TwitterSession};
use crate::config::SettingsHandle;
use crate::task::Platform;

use super::http::build_resolver_http_client;
use super::{CrawlOutcome, PageCallback, ResolveError, ResolvedItem, Resolver};

const DEFAULT_BASE_URL: &str = "https://twitter.com";
const PAGE_SIZE: u32 = 20;

#[derive(Debug, Deserialize)]
struct TimelinePage {
    #[serde(default)]
    entries: Vec<TimelineEntry>,
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct TimelineEntry {
    tweet_id: String,
    author: String,
    author_id: String,
    #[serde(default)]
    videos: Vec<String>,
    #[serde(default)]
    photos: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UserLookup {
    id: String,
}

/// Resolver crawling a user's media timeline.
pub struct TwitterResolver {
    client: Client,
    base_url: String,
    settings: SettingsHandle,
}

impl std::fmt::Debug for TwitterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwitterResolver {
    /// Creates a resolver against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when HTTP client construction fails.
    pub fn new(settings: SettingsHandle) -> Result<Self, ResolveError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Creates a resolver against a custom endpoint for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when HTTP client construction fails.
    pub fn with_base_url(
        settings: SettingsHandle,
        base_url: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_resolver_http_client("twitter")?,
            base_url: base_url.into(),
            settings,
        })
    }

    /// Crawls the full media timeline of `user_id`.
    ///
    /// Each page's new (deduplicated) items are handed to `on_page` as they
    /// arrive, then accumulated into the returned outcome. The inter-page
    /// delay is read live from settings before each sleep.
    #[instrument(skip(self, session, on_page), fields(user_id = %user_id))]
    pub async fn crawl_timeline(
        &self,
        user_id: &str,
        session: &TwitterSession,
        on_page: PageCallback<'_>,
    ) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();
        let mut cursor: Option<String> = None;
        let mut consumed_cursors: HashSet<String> = HashSet::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut pages_fetched = 0u32;

        loop {
            let page = match self.fetch_page(user_id, cursor.as_deref(), session).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(pages_fetched, error = %error, "timeline crawl stopped on fetch error");
                    outcome.error = Some(ResolveError::page_fetch_exhausted(pages_fetched, error));
                    return outcome;
                }
            };
            pages_fetched += 1;

            let mut fresh = Vec::new();
            for entry in page.entries {
                if !seen_ids.insert(entry.tweet_id.clone()) {
                    continue;
                }
                fresh.push(ResolvedItem {
                    author: entry.author,
                    author_id: entry.author_id,
                    title: entry.tweet_id,
                    videos: entry.videos,
                    photos: entry.photos,
                    documents: Vec::new(),
                });
            }
            if !fresh.is_empty() {
                on_page(&fresh);
                outcome.items.extend(fresh);
            }

            if let Some(used) = cursor.take() {
                consumed_cursors.insert(used.clone());
                cursor = Some(used);
            }

            let next = page.next_cursor;
            if next.is_empty() {
                debug!(pages_fetched, "timeline crawl ended: empty cursor");
                return outcome;
            }
            if cursor.as_deref() == Some(next.as_str()) {
                debug!(pages_fetched, "timeline crawl ended: cursor repeated");
                return outcome;
            }
            if consumed_cursors.contains(&next) {
                debug!(pages_fetched, "timeline crawl ended: cursor loop detected");
                return outcome;
            }

            cursor = Some(next);
            let delay = self.settings.snapshot().inter_page_delay;
            tokio::time::sleep(delay).await;
        }
    }

    async fn fetch_page(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        session: &TwitterSession,
    ) -> Result<TimelinePage, ResolveError> {
        let mut endpoint = format!(
            "{}/i/api/timeline/media?user_id={user_id}&count={PAGE_SIZE}",
            self.base_url
        );
        if let Some(cursor) = cursor {
            endpoint.push_str("&cursor=");
            endpoint.push_str(cursor);
        }

        let response = self
            .client
            .get(&endpoint)
            .header("x-csrf-token", &session.csrf_token)
            .header(COOKIE, cookie_value(session))
            .send()
            .await
            .map_err(|e| ResolveError::network(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(&endpoint, status.as_u16()));
        }

        response
            .json::<TimelinePage>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed timeline page: {e}")))
    }

    async fn lookup_user_id(
        &self,
        screen_name: &str,
        session: &TwitterSession,
    ) -> Result<String, ResolveError> {
        let endpoint = format!("{}/i/api/users/by/username/{screen_name}", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header("x-csrf-token", &session.csrf_token)
            .header(COOKIE, cookie_value(session))
            .send()
            .await
            .map_err(|e| ResolveError::network(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(&endpoint, status.as_u16()));
        }

        let lookup = response
            .json::<UserLookup>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed user lookup: {e}")))?;
        Ok(lookup.id)
    }
}

fn cookie_value(session: &TwitterSession) -> String {
    session
        .cookies()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Extracts the screen name from a profile or media-timeline link.
fn screen_name_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()?
        .find(|s| !s.is_empty())?
        .to_string();
    // Reserved paths that are not profiles.
    if matches!(segment.as_str(), "i" | "home" | "search" | "explore") {
        return None;
    }
    Some(segment)
}

#[async_trait]
impl Resolver for TwitterResolver {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(
            url.host_str(),
            Some("twitter.com" | "www.twitter.com" | "x.com" | "www.x.com" | "mobile.twitter.com")
        )
    }

    #[instrument(skip(self, credentials), fields(resolver = "twitter", url = %source_url))]
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let session = credentials
            .twitter()
            .ok_or_else(|| ResolveError::auth_missing(Platform::Twitter))?;

        let url = Url::parse(source_url)
            .map_err(|_| ResolveError::parse(format!("not a valid URL: {source_url}")))?;
        let screen_name = screen_name_from_url(&url)
            .ok_or_else(|| ResolveError::parse(format!("no screen name in {source_url}")))?;

        let user_id = self.lookup_user_id(&screen_name, &session).await?;

        let mut sink = |_: &[ResolvedItem]| {};
        let outcome = self.crawl_timeline(&user_id, &session, &mut sink).await;

        match (outcome.items.is_empty(), outcome.error) {
            (true, Some(error)) => Err(error),
            (_, Some(error)) => {
                warn!(error = %error, items = outcome.items.len(), "returning partial timeline");
                Ok(outcome.items)
            }
            (_, None) => Ok(outcome.items),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_name_extraction() {
        let url = Url::parse("https://twitter.com/some_artist/media").unwrap();
        assert_eq!(screen_name_from_url(&url).unwrap(), "some_artist");

        let url = Url::parse("https://x.com/other").unwrap();
        assert_eq!(screen_name_from_url(&url).unwrap(), "other");

        let url = Url::parse("https://twitter.com/i/lists/9").unwrap();
        assert!(screen_name_from_url(&url).is_none());
    }

    #[test]
    fn test_cookie_value_joins_session_pair() {
        let session = TwitterSession {
            csrf_token: "csrf".to_string(),
            auth_token: "tok".to_string(),
            user_id: 42,
        };
        let cookie = cookie_value(&session);
        assert!(cookie.contains("auth_token=tok"));
        assert!(cookie.contains("ct0=csrf"));
    }

    #[test]
    fn test_timeline_page_parses_with_defaults() {
        let page: TimelinePage = serde_json::from_str(r#"{"entries": []}"#).unwrap();
        assert!(page.entries.is_empty());
        assert!(page.next_cursor.is_empty());
    }
}
