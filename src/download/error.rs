//! Error types for the download module.
//!
//! Structured errors for transfer and admission operations, with
//! context-rich messages for debugging and user-facing failure records.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a task.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during sink allocation or writing.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The sink path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Document composition failed (page decode or PDF assembly).
    #[error("document composition failed: {message}")]
    Document {
        /// What went wrong.
        message: String,
    },

    /// Not enough free space at the destination; checked before enqueue.
    #[error("insufficient space: {required} bytes required, {available} available")]
    InsufficientSpace {
        /// Minimum free bytes required.
        required: u64,
        /// Free bytes reported by the probe.
        available: u64,
    },

    /// No network connectivity; checked before enqueue.
    #[error("no network connection available")]
    NoNetwork,

    /// Wi-Fi-only policy is active but the device is not on Wi-Fi.
    #[error("downloads restricted to Wi-Fi by configuration")]
    WifiRequired,
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a document composition error.
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or
// `From<std::io::Error>` because the variants require context (url, path)
// that the source errors don't provide. The helper constructors are the
// correct pattern here.
