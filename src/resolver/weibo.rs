//! Weibo status resolver (single-shot).
//!
//! One authenticated status request; extracts the video stream URL and/or
//! the original-size photos.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::auth::CredentialStore;
use crate::task::Platform;

use super::http::build_resolver_http_client;
use super::{ResolveError, ResolvedItem, Resolver};

const DEFAULT_BASE_URL: &str = "https://weibo.com";

#[derive(Debug, Deserialize)]
struct StatusShow {
    user: StatusUser,
    #[serde(default)]
    page_info: Option<PageInfo>,
    #[serde(default)]
    pics: Vec<Pic>,
    #[serde(default)]
    text_raw: String,
}

#[derive(Debug, Deserialize)]
struct StatusUser {
    id: u64,
    screen_name: String,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    media_info: Option<MediaInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaInfo {
    #[serde(default)]
    stream_url: String,
}

#[derive(Debug, Deserialize)]
struct Pic {
    large: PicUrl,
}

#[derive(Debug, Deserialize)]
struct PicUrl {
    url: String,
}

/// Resolver for single status links.
pub struct WeiboResolver {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for WeiboResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeiboResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WeiboResolver {
    /// Creates a resolver against the production endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when HTTP client construction fails.
    pub fn new() -> Result<Self, ResolveError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Creates a resolver against a custom endpoint for tests.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when HTTP client construction fails.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ResolveError> {
        Ok(Self {
            client: build_resolver_http_client("weibo")?,
            base_url: base_url.into(),
        })
    }
}

/// Extracts the status id from `/<uid>/<status>` links.
fn status_id_from_url(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    // The literal-prefix arm must come first; a catch-all uid arm would
    // shadow it.
    match segments.as_slice() {
        ["detail" | "status", status] => Some((*status).to_string()),
        [_uid, status] => Some((*status).to_string()),
        _ => None,
    }
}

#[async_trait]
impl Resolver for WeiboResolver {
    fn platform(&self) -> Platform {
        Platform::Weibo
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            host == "weibo.com"
                || host.ends_with(".weibo.com")
                || host == "weibo.cn"
                || host.ends_with(".weibo.cn")
        })
    }

    #[instrument(skip(self, credentials), fields(resolver = "weibo", url = %source_url))]
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let session = credentials
            .session_id(Platform::Weibo)
            .ok_or_else(|| ResolveError::auth_missing(Platform::Weibo))?;

        let url = Url::parse(source_url)
            .map_err(|_| ResolveError::parse(format!("not a valid URL: {source_url}")))?;
        let status_id = status_id_from_url(&url)
            .ok_or_else(|| ResolveError::parse(format!("no status id in {source_url}")))?;

        let endpoint = format!("{}/ajax/statuses/show?id={status_id}", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header(COOKIE, format!("SUB={}", session.0))
            .send()
            .await
            .map_err(|e| ResolveError::network(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(&endpoint, status.as_u16()));
        }

        let show = response
            .json::<StatusShow>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed status: {e}")))?;

        let videos = show
            .page_info
            .and_then(|p| p.media_info)
            .map(|m| m.stream_url)
            .filter(|u| !u.is_empty())
            .into_iter()
            .collect();
        let photos = show.pics.into_iter().map(|p| p.large.url).collect();

        let item = ResolvedItem {
            author: show.user.screen_name,
            author_id: show.user.id.to_string(),
            title: if show.text_raw.is_empty() {
                status_id
            } else {
                show.text_raw.chars().take(40).collect()
            },
            videos,
            photos,
            documents: Vec::new(),
        };
        Ok(if item.is_empty() { Vec::new() } else { vec![item] })
    }
}
