//! Lofter blog-archive resolver: a time-windowed, tag-filtered crawler.
//!
//! The archive endpoint is paged with a timestamp cursor. The outer crawl
//! ends when a page comes back short of the fixed page size, or early when a
//! start-time boundary exists and the page's oldest entry already predates
//! it. Accumulated entries (time-descending) are then filtered against the
//! time window and each survivor's detail page is fetched to match its tags
//! against the caller's target set. Image numbering resets per distinct
//! entry timestamp so file names stay stable across re-crawls.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{CredentialStore, LofterSession};
use crate::config::SettingsHandle;
use crate::task::Platform;

use super::http::build_resolver_http_client;
use super::{CrawlOutcome, ResolveError, ResolvedItem, Resolver};

/// Fixed archive page size; a short page ends the crawl.
pub const PAGE_SIZE: usize = 50;

/// Jitter bounds for the per-detail-page delay, in milliseconds.
const DETAIL_JITTER_MS: std::ops::RangeInclusive<u64> = 200..=600;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Pattern is static and known-good; tested below.
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"(?i)class="tag"[^>]*>([^<]+)<"#).unwrap()
});
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r#"bigimgsrc="([^"]+)""#).unwrap()
});

/// One raw archive row, ephemeral within a single crawl.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Cover image URL from the archive listing.
    pub image_url: String,
    /// Detail page URL carrying tags and full-size images.
    pub page_url: String,
    /// Post timestamp, Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct ArchivePage {
    #[serde(default)]
    entries: Vec<ArchiveEntry>,
}

/// Caller-supplied window and tag constraints for an archive crawl.
#[derive(Debug, Clone, Default)]
pub struct ArchiveFilter {
    /// Entries strictly older than this are never consumed.
    pub start_time: Option<DateTime<Utc>>,
    /// Entries strictly newer than this are skipped individually.
    pub end_time: Option<DateTime<Utc>>,
    /// Target tags; an entry survives when any of its tags is targeted.
    /// An empty target set matches every tagged entry.
    pub target_tags: Vec<String>,
    /// Keep entries whose detail page carries no tags at all.
    pub save_untagged: bool,
}

/// Resolver crawling a blog's archive within a time window.
pub struct LofterResolver {
    client: Client,
    settings: SettingsHandle,
}

impl std::fmt::Debug for LofterResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LofterResolver").finish_non_exhaustive()
    }
}

impl LofterResolver {
    /// Creates a resolver. Archive requests go to the blog host taken from
    /// the source link itself, so no base URL is configured here.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when HTTP client construction fails.
    pub fn new(settings: SettingsHandle) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_resolver_http_client("lofter")?,
            settings,
        })
    }

    /// Crawls `blog_url`'s archive, filters it, and resolves the survivors'
    /// images.
    ///
    /// Items are grouped per distinct entry timestamp; photo order within a
    /// group restarts numbering for the caller. A page-fetch error stops the
    /// paging but the entries already accumulated are still filtered and
    /// returned beside the error.
    #[instrument(skip(self, session, filter), fields(blog = %blog_url))]
    pub async fn crawl_archive(
        &self,
        blog_url: &str,
        session: &LofterSession,
        filter: &ArchiveFilter,
    ) -> CrawlOutcome {
        let mut outcome = CrawlOutcome::default();
        let (raw, page_error) = self.collect_pages(blog_url, session, filter).await;
        outcome.error = page_error;

        let author = blog_author(blog_url);
        let survivors = self.filter_entries(&raw, session, filter).await;
        outcome.items = group_by_timestamp(&author, survivors);
        outcome
    }

    /// Pages the archive endpoint until exhausted or out of the window.
    async fn collect_pages(
        &self,
        blog_url: &str,
        session: &LofterSession,
        filter: &ArchiveFilter,
    ) -> (Vec<ArchiveEntry>, Option<ResolveError>) {
        let mut raw: Vec<ArchiveEntry> = Vec::new();
        let mut cursor: Option<i64> = None;
        let mut pages_fetched = 0u32;

        loop {
            let page = match self.fetch_page(blog_url, cursor, session).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(pages_fetched, error = %error, "archive crawl stopped on fetch error");
                    return (
                        raw,
                        Some(ResolveError::page_fetch_exhausted(pages_fetched, error)),
                    );
                }
            };
            pages_fetched += 1;

            let count = page.entries.len();
            let oldest = page.entries.last().map(|e| e.timestamp);
            raw.extend(page.entries);

            if count < PAGE_SIZE {
                debug!(pages_fetched, "archive crawl ended: short page");
                return (raw, None);
            }
            if let Some(start) = filter.start_time
                && let Some(oldest) = oldest
                && oldest < start.timestamp()
            {
                debug!(pages_fetched, "archive crawl ended: page predates start time");
                return (raw, None);
            }

            cursor = oldest;
            let delay = self.settings.snapshot().inter_page_delay;
            tokio::time::sleep(delay).await;
        }
    }

    /// Applies the time window and tag filter, fetching each survivor's
    /// detail page. Entries are assumed time-descending: the first entry
    /// older than the start boundary ends filtering entirely. Infallible;
    /// a failed detail fetch skips that entry only.
    async fn filter_entries(
        &self,
        entries: &[ArchiveEntry],
        session: &LofterSession,
        filter: &ArchiveFilter,
    ) -> Vec<(i64, Vec<String>)> {
        let targets: HashSet<&str> = filter.target_tags.iter().map(String::as_str).collect();
        let mut survivors = Vec::new();

        for entry in entries {
            if let Some(start) = filter.start_time
                && entry.timestamp < start.timestamp()
            {
                break;
            }
            if let Some(end) = filter.end_time
                && entry.timestamp > end.timestamp()
            {
                continue;
            }

            let jitter = rand::thread_rng().gen_range(DETAIL_JITTER_MS);
            tokio::time::sleep(Duration::from_millis(jitter)).await;

            let html = match self.fetch_detail(&entry.page_url, session).await {
                Ok(html) => html,
                Err(error) => {
                    warn!(page = %entry.page_url, error = %error, "skipping entry, detail fetch failed");
                    continue;
                }
            };

            let tags = extract_tags(&html);
            let keep = if tags.is_empty() {
                filter.save_untagged
            } else {
                targets.is_empty() || tags.iter().any(|t| targets.contains(t.as_str()))
            };
            if !keep {
                continue;
            }

            let images = extract_images(&html);
            if !images.is_empty() {
                survivors.push((entry.timestamp, images));
            }
        }

        survivors
    }

    async fn fetch_page(
        &self,
        blog_url: &str,
        cursor: Option<i64>,
        session: &LofterSession,
    ) -> Result<ArchivePage, ResolveError> {
        let endpoint = format!("{}/api/archive", blog_url.trim_end_matches('/'));
        let body = json!({
            "timestamp": cursor,
            "count": PAGE_SIZE,
        });

        let response = self
            .client
            .post(&endpoint)
            .header(COOKIE, cookie_value(session))
            .json(&body)
            .send()
            .await
            .map_err(|e| ResolveError::network(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(&endpoint, status.as_u16()));
        }

        response
            .json::<ArchivePage>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed archive page: {e}")))
    }

    async fn fetch_detail(
        &self,
        page_url: &str,
        session: &LofterSession,
    ) -> Result<String, ResolveError> {
        let response = self
            .client
            .get(page_url)
            .header(COOKIE, cookie_value(session))
            .send()
            .await
            .map_err(|e| ResolveError::network(page_url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(page_url, status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| ResolveError::network(page_url, e.to_string()))
    }
}

fn cookie_value(session: &LofterSession) -> String {
    session
        .cookies()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Blog author from the subdomain of a `*.lofter.com` link.
fn blog_author(blog_url: &str) -> String {
    Url::parse(blog_url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .and_then(|host| host.split('.').next().map(ToString::to_string))
        .unwrap_or_else(|| "lofter".to_string())
}

fn extract_tags(html: &str) -> Vec<String> {
    TAG_RE
        .captures_iter(html)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn extract_images(html: &str) -> Vec<String> {
    IMAGE_RE
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

/// Groups surviving images into one item per distinct timestamp, so the
/// caller's per-item numbering restarts at each bucket.
fn group_by_timestamp(author: &str, survivors: Vec<(i64, Vec<String>)>) -> Vec<ResolvedItem> {
    let mut items: Vec<ResolvedItem> = Vec::new();
    let mut current_ts: Option<i64> = None;

    for (timestamp, images) in survivors {
        if current_ts == Some(timestamp)
            && let Some(last) = items.last_mut()
        {
            last.photos.extend(images);
            continue;
        }
        current_ts = Some(timestamp);
        let label = Utc
            .timestamp_opt(timestamp, 0)
            .single()
            .map_or_else(|| timestamp.to_string(), |t| t.format("%Y%m%d_%H%M%S").to_string());
        items.push(ResolvedItem {
            author: author.to_string(),
            author_id: author.to_string(),
            title: label,
            videos: Vec::new(),
            photos: images,
            documents: Vec::new(),
        });
    }

    items
}

#[async_trait]
impl Resolver for LofterResolver {
    fn platform(&self) -> Platform {
        Platform::Lofter
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host == "lofter.com" || host.ends_with(".lofter.com"))
    }

    #[instrument(skip(self, credentials), fields(resolver = "lofter", url = %source_url))]
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let session = credentials
            .lofter()
            .ok_or_else(|| ResolveError::auth_missing(Platform::Lofter))?;

        // No window and no target tags: keep everything, untagged included.
        let filter = ArchiveFilter {
            save_untagged: true,
            ..ArchiveFilter::default()
        };
        let outcome = self.crawl_archive(source_url, &session, &filter).await;

        match (outcome.items.is_empty(), outcome.error) {
            (true, Some(error)) => Err(error),
            (_, Some(error)) => {
                warn!(error = %error, items = outcome.items.len(), "returning partial archive");
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
    fn test_extract_tags() {
        let html = r#"<a class="tag" href="/tag/art">art</a><a class="tag">sketch</a>"#;
        assert_eq!(extract_tags(html), vec!["art", "sketch"]);
    }

    #[test]
    fn test_extract_tags_none() {
        assert!(extract_tags("<html><body>plain post</body></html>").is_empty());
    }

    #[test]
    fn test_extract_images() {
        let html = r#"<img bigimgsrc="https://img.example.com/a.jpg" /> <img bigimgsrc="https://img.example.com/b.jpg" />"#;
        assert_eq!(
            extract_images(html),
            vec![
                "https://img.example.com/a.jpg",
                "https://img.example.com/b.jpg"
            ]
        );
    }

    #[test]
    fn test_blog_author_from_subdomain() {
        assert_eq!(blog_author("https://someone.lofter.com/"), "someone");
    }

    #[test]
    fn test_group_by_timestamp_buckets() {
        let survivors = vec![
            (200, vec!["a.jpg".to_string(), "b.jpg".to_string()]),
            (200, vec!["c.jpg".to_string()]),
            (100, vec!["d.jpg".to_string()]),
        ];
        let items = group_by_timestamp("author", survivors);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].photos, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(items[1].photos, vec!["d.jpg"]);
        assert_ne!(items[0].title, items[1].title);
    }

    #[test]
    fn test_archive_page_parses_with_defaults() {
        let page: ArchivePage = serde_json::from_str("{}").unwrap();
        assert!(page.entries.is_empty());
    }
}
