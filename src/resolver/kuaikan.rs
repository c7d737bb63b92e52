//! Kuaikan comic-chapter resolver (single-shot).
//!
//! One authenticated chapter request returning the ordered page-image list.
//! The chapter is emitted as a document source; the transfer engine composes
//! the pages into a single paged PDF.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::COOKIE;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use crate::auth::CredentialStore;
use crate::task::Platform;

use super::http::build_resolver_http_client;
use super::{DocumentSource, ResolveError, ResolvedItem, Resolver};

const DEFAULT_BASE_URL: &str = "https://www.kuaikanmanhua.com";

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    data: ChapterData,
}

#[derive(Debug, Deserialize)]
struct ChapterData {
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    images: Vec<String>,
}

/// Resolver for comic chapter links.
pub struct KuaikanResolver {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for KuaikanResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KuaikanResolver")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl KuaikanResolver {
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
            client: build_resolver_http_client("kuaikan")?,
            base_url: base_url.into(),
        })
    }
}

/// Extracts the chapter id from the trailing numeric path segment.
fn chapter_id_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()))
        .map(ToString::to_string)
}

#[async_trait]
impl Resolver for KuaikanResolver {
    fn platform(&self) -> Platform {
        Platform::Kuaikan
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            host == "kuaikanmanhua.com" || host.ends_with(".kuaikanmanhua.com")
        })
    }

    #[instrument(skip(self, credentials), fields(resolver = "kuaikan", url = %source_url))]
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let session = credentials
            .session_id(Platform::Kuaikan)
            .ok_or_else(|| ResolveError::auth_missing(Platform::Kuaikan))?;

        let url = Url::parse(source_url)
            .map_err(|_| ResolveError::parse(format!("not a valid URL: {source_url}")))?;
        let chapter_id = chapter_id_from_url(&url)
            .ok_or_else(|| ResolveError::parse(format!("no chapter id in {source_url}")))?;

        let endpoint = format!("{}/v1/comics/{chapter_id}", self.base_url);
        let response = self
            .client
            .get(&endpoint)
            .header(COOKIE, format!("session_id={}", session.0))
            .send()
            .await
            .map_err(|e| ResolveError::network(&endpoint, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::http_status(&endpoint, status.as_u16()));
        }

        let chapter = response
            .json::<ChapterResponse>()
            .await
            .map_err(|e| ResolveError::parse(format!("malformed chapter: {e}")))?;

        if chapter.data.images.is_empty() {
            return Err(ResolveError::parse(format!(
                "chapter {chapter_id} carries no page images"
            )));
        }

        let title = chapter.data.title;
        Ok(vec![ResolvedItem {
            author: chapter.data.author,
            author_id: String::new(),
            title: title.clone(),
            videos: Vec::new(),
            photos: Vec::new(),
            documents: vec![DocumentSource {
                name: format!("{title}.pdf"),
                page_urls: chapter.data.images,
            }],
        }])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_id_extraction() {
        let url = Url::parse("https://www.kuaikanmanhua.com/webs/comic-next/652963").unwrap();
        assert_eq!(chapter_id_from_url(&url).unwrap(), "652963");

        let url = Url::parse("https://www.kuaikanmanhua.com/about").unwrap();
        assert!(chapter_id_from_url(&url).is_none());
    }

    #[test]
    fn test_chapter_parses() {
        let json = r#"{"data":{"title":"chapter 12","author":"someone","images":["https://i.example.com/1.webp"]}}"#;
        let chapter: ChapterResponse = serde_json::from_str(json).unwrap();
        assert_eq!(chapter.data.title, "chapter 12");
        assert_eq!(chapter.data.images.len(), 1);
    }
}
