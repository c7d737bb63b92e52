//! Error types for platform resolution.

use thiserror::Error;

use crate::task::Platform;

/// Errors that can occur while resolving a source URL into download items.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Transport failure or non-2xx response from the platform endpoint.
    #[error("network error resolving {url}{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Network {
        /// The endpoint that failed.
        url: String,
        /// HTTP status when the server answered at all.
        status: Option<u16>,
        /// Human-readable description.
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("parse error: {message}")]
    Parse {
        /// What was malformed.
        message: String,
    },

    /// The platform requires session credentials that are absent or expired.
    #[error("no valid credentials for {platform}")]
    AuthMissing {
        /// The platform whose credentials are missing.
        platform: Platform,
    },

    /// A paged crawl stopped on a fetch error after accumulating results.
    ///
    /// Not itself a remote failure; it records how far the crawl got and the
    /// trailing error that ended it. The partial items travel beside it in a
    /// [`CrawlOutcome`](super::CrawlOutcome).
    #[error("crawl stopped after {pages_fetched} page(s): {source}")]
    PageFetchExhausted {
        /// Pages successfully consumed before the failure.
        pages_fetched: u32,
        /// The error that ended the crawl.
        #[source]
        source: Box<ResolveError>,
    },
}

impl ResolveError {
    /// Creates a transport-level network error.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Creates a network error carrying the HTTP status.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::Network {
            url: url.into(),
            status: Some(status),
            message: "unexpected status".to_string(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Creates a missing-credentials error.
    #[must_use]
    pub fn auth_missing(platform: Platform) -> Self {
        Self::AuthMissing { platform }
    }

    /// Wraps the trailing error of a partial crawl.
    #[must_use]
    pub fn page_fetch_exhausted(pages_fetched: u32, source: ResolveError) -> Self {
        Self::PageFetchExhausted {
            pages_fetched,
            source: Box::new(source),
        }
    }
}
