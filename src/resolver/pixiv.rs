//! Pixiv illustration resolver (single-shot).
//!
//! One authenticated illust-detail request; multi-page works need a second
//! request for the full original-URL list.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{COOKIE, REFERER};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::auth::CredentialStore;
use crate::task::Platform;

use super::http::build_resolver_http_client;
use super::{ResolveError, ResolvedItem, Resolver};

const DEFAULT_BASE_URL: &str = "https://www.pixiv.net";

#[derive(Debug, Deserialize)]
struct IllustDetail {
    body: IllustBody,
}

#[derive(Debug, Deserialize)]
struct IllustBody {
    title: String,
    #[serde(rename = "userName")]
    user_name: String,
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "pageCount")]
    page_count: u32,
    urls: IllustUrls,
}

#[derive(Debug, Deserialize)]
struct IllustUrls {
    original: String,
}

#[derive(Debug, Deserialize)]
struct IllustPages {
    body: Vec<IllustPage>,
}

#[derive(Debug, Deserialize)]
struct IllustPage {
    urls: IllustUrls,
}

/// Resolver for single illustration links.
pub struct PixivResolver {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for PixivResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixivResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PixivResolver {
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
            client: build_resolver_http_client("pixiv")?,
            base_url: base_url.into(),
        })
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        session_id: &str,
    ) -> Result<T, ResolveError> {
        let response = self
            .client
            .get(endpoint)
            .header(COOKIE, format!("PHPSESSID={session_id}"))
            .header(REFERER, &self.base_url)
            .send()
            .await
            .map_err(|e| ResolveError::network(endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(endpoint, status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed pixiv response: {e}")))
    }
}

/// Extracts the work id from `/artworks/<id>` links.
fn illust_id_from_url(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    loop {
        match segments.next()? {
            "artworks" => break,
            _ => continue,
        }
    }
    let id = segments.next()?;
    id.chars().all(|c| c.is_ascii_digit()).then(|| id.to_string())
}

#[async_trait]
impl Resolver for PixivResolver {
    fn platform(&self) -> Platform {
        Platform::Pixiv
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|host| host == "pixiv.net" || host.ends_with(".pixiv.net"))
    }

    #[instrument(skip(self, credentials), fields(resolver = "pixiv", url = %source_url))]
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let session = credentials
            .session_id(Platform::Pixiv)
            .ok_or_else(|| ResolveError::auth_missing(Platform::Pixiv))?;

        let url = Url::parse(source_url)
            .map_err(|_| ResolveError::parse(format!("not a valid URL: {source_url}")))?;
        let illust_id = illust_id_from_url(&url)
            .ok_or_else(|| ResolveError::parse(format!("no illustration id in {source_url}")))?;

        let endpoint = format!("{}/ajax/illust/{illust_id}", self.base_url);
        let detail: IllustDetail = self.fetch_json(&endpoint, &session.0).await?;

        let photos = if detail.body.page_count > 1 {
            let endpoint = format!("{}/ajax/illust/{illust_id}/pages", self.base_url);
            let pages: IllustPages = self.fetch_json(&endpoint, &session.0).await?;
            pages.body.into_iter().map(|p| p.urls.original).collect()
        } else {
            vec![detail.body.urls.original]
        };

        Ok(vec![ResolvedItem {
            author: detail.body.user_name,
            author_id: detail.body.user_id,
            title: detail.body.title,
            videos: Vec::new(),
            photos,
            documents: Vec::new(),
        }])
    }
}
