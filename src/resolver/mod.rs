//! Platform resolution: turning a source link into downloadable items.
//!
//! Each platform gets one resolver implementing the [`Resolver`] trait; the
//! [`ResolverRegistry`] dispatches on the link's host. Two resolvers are
//! pagination crawlers (Twitter's cursor timeline, Lofter's time-windowed
//! archive); the other three resolve in a single authenticated request.
//! Resolvers are read-only against the remote service and never mutate local
//! state; the caller builds [`DownloadTask`](crate::task::DownloadTask)s from
//! the returned items.

mod error;
mod http;
mod kuaikan;
mod lofter;
mod pixiv;
mod twitter;
mod weibo;

pub use error::ResolveError;
pub use http::build_resolver_http_client;
pub use kuaikan::KuaikanResolver;
pub use lofter::{ArchiveEntry, ArchiveFilter, LofterResolver, PAGE_SIZE};
pub use pixiv::PixivResolver;
pub use twitter::TwitterResolver;
pub use weibo::WeiboResolver;

use async_trait::async_trait;
use tracing::warn;
use url::Url;

use crate::auth::CredentialStore;
use crate::config::SettingsHandle;
use crate::task::Platform;

/// A multi-image source composed into one paged document at transfer time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSource {
    /// Preferred document file name (including extension).
    pub name: String,
    /// Ordered page-image URLs.
    pub page_urls: Vec<String>,
}

/// One resolved unit of content, grouped by origin post/work.
///
/// Consumed immediately to build download tasks; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedItem {
    /// Display name of the author.
    pub author: String,
    /// Platform-side author id.
    pub author_id: String,
    /// Title or bucket label the caller derives file names from.
    pub title: String,
    /// Video stream URLs.
    pub videos: Vec<String>,
    /// Photo URLs, in origin order.
    pub photos: Vec<String>,
    /// Multi-image documents.
    pub documents: Vec<DocumentSource>,
}

impl ResolvedItem {
    /// True when the item carries no downloadable media at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty() && self.photos.is_empty() && self.documents.is_empty()
    }
}

/// Result of a paged crawl: everything accumulated plus the error that ended
/// the crawl early, if any.
///
/// Partial success is preserved, never discarded; a crawl that walked two
/// pages and died on the third still hands back two pages of items.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    /// Items accumulated across all successfully fetched pages.
    pub items: Vec<ResolvedItem>,
    /// The error that stopped the crawl, when it did not end cleanly.
    pub error: Option<ResolveError>,
}

/// Incremental page callback invoked with each page's new (deduplicated)
/// items as the crawl progresses.
pub type PageCallback<'a> = &'a mut (dyn FnMut(&[ResolvedItem]) + Send);

/// Trait all platform resolvers implement.
///
/// `async_trait` keeps the trait object-safe for the registry.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// The platform this resolver serves.
    fn platform(&self) -> Platform;

    /// Returns true when this resolver handles the given link.
    fn can_handle(&self, url: &Url) -> bool;

    /// Resolves a source link into zero or more items.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::AuthMissing`] without touching the network
    /// when the platform's credentials are absent or expired; network and
    /// parse errors otherwise.
    async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError>;
}

/// Host-dispatching collection of platform resolvers.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn Resolver>>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.resolvers.len())
            .finish()
    }
}

impl ResolverRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// Registers a resolver. Dispatch tries resolvers in registration order.
    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        self.resolvers.push(resolver);
    }

    /// Finds the platform serving `source_url`, if any resolver claims it.
    #[must_use]
    pub fn detect_platform(&self, source_url: &str) -> Option<Platform> {
        let url = Url::parse(source_url).ok()?;
        self.resolvers
            .iter()
            .find(|r| r.can_handle(&url))
            .map(|r| r.platform())
    }

    /// Resolves a link through the first resolver that claims it.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Parse`] when the link is malformed or no
    /// resolver handles its host; resolver errors otherwise.
    pub async fn resolve(
        &self,
        source_url: &str,
        credentials: &CredentialStore,
    ) -> Result<Vec<ResolvedItem>, ResolveError> {
        let url = Url::parse(source_url)
            .map_err(|_| ResolveError::parse(format!("not a valid URL: {source_url}")))?;

        let Some(resolver) = self.resolvers.iter().find(|r| r.can_handle(&url)) else {
            return Err(ResolveError::parse(format!(
                "no resolver for host {}",
                url.host_str().unwrap_or("<none>")
            )));
        };

        resolver.resolve(source_url, credentials).await
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the registry covering all five supported platforms.
///
/// A resolver whose HTTP client cannot be constructed is skipped with a
/// warning instead of failing the whole registry.
#[must_use]
pub fn build_default_resolver_registry(settings: SettingsHandle) -> ResolverRegistry {
    let mut registry = ResolverRegistry::new();

    match TwitterResolver::new(settings.clone()) {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "twitter resolver unavailable"),
    }
    match LofterResolver::new(settings) {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "lofter resolver unavailable"),
    }
    match PixivResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "pixiv resolver unavailable"),
    }
    match WeiboResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "weibo resolver unavailable"),
    }
    match KuaikanResolver::new() {
        Ok(resolver) => registry.register(Box::new(resolver)),
        Err(error) => warn!(error = %error, "kuaikan resolver unavailable"),
    }

    registry
}
