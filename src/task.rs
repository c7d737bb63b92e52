//! Download task descriptors produced by resolvers and consumed by the pipeline.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Source platform a task was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Timeline platform paged with opaque cursors.
    Twitter,
    /// Blog-archive platform paged with timestamp cursors.
    Lofter,
    /// Illustration platform, single-shot resolution.
    Pixiv,
    /// Status platform, single-shot resolution.
    Weibo,
    /// Comic platform, single-shot resolution into a paged document.
    Kuaikan,
}

impl Platform {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Lofter => "lofter",
            Self::Pixiv => "pixiv",
            Self::Weibo => "weibo",
            Self::Kuaikan => "kuaikan",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitter" => Ok(Self::Twitter),
            "lofter" => Ok(Self::Lofter),
            "pixiv" => Ok(Self::Pixiv),
            "weibo" => Ok(Self::Weibo),
            "kuaikan" => Ok(Self::Kuaikan),
            _ => Err(format!("invalid platform: {s}")),
        }
    }
}

/// Kind of media a task transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A single video stream.
    Video,
    /// A single image.
    Photo,
    /// Multiple page images composed into one paged document.
    Document,
}

impl MediaKind {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Photo => "photo",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "photo" => Ok(Self::Photo),
            "document" => Ok(Self::Document),
            _ => Err(format!("invalid media kind: {s}")),
        }
    }
}

/// Stable admission identity derived from a task descriptor.
///
/// Two tasks describing the same resource hash to the same key, making
/// enqueue idempotent. Distinct from [`DownloadTask::id`], which is unique
/// per enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnqueueKey(String);

impl EnqueueKey {
    /// Returns the hex digest backing this key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnqueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One logical download produced by a resolver.
///
/// Immutable once enqueued. For `MediaKind::Document` tasks `source_url` is
/// the first page URL and `document_pages` carries the full ordered page
/// list; for the other kinds `document_pages` is empty.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Unique identity for the lifetime of the queue (UUIDv4).
    pub id: Uuid,
    /// Resolved resource URL.
    pub source_url: String,
    /// Platform the task was resolved from.
    pub platform: Platform,
    /// Media kind, selects the transfer path.
    pub media_kind: MediaKind,
    /// Destination directory for the sink allocation.
    pub dest_dir: PathBuf,
    /// Preferred file name (including extension).
    pub file_name: String,
    /// Request headers attached verbatim to the transfer.
    pub headers: Vec<(String, String)>,
    /// Session cookies attached as a single Cookie header.
    pub cookies: Vec<(String, String)>,
    /// Ordered page-image URLs for document tasks.
    pub document_pages: Vec<String>,
    /// Admission priority, higher first (default 0).
    pub priority: i64,
}

impl DownloadTask {
    /// Creates a task with a fresh id and no headers, cookies, or pages.
    #[must_use]
    pub fn new(
        source_url: impl Into<String>,
        platform: Platform,
        media_kind: MediaKind,
        dest_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            platform,
            media_kind,
            dest_dir: dest_dir.into(),
            file_name: file_name.into(),
            headers: Vec::new(),
            cookies: Vec::new(),
            document_pages: Vec::new(),
            priority: 0,
        }
    }

    /// Attaches request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Attaches session cookies.
    #[must_use]
    pub fn with_cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Attaches the ordered page list for a document task.
    #[must_use]
    pub fn with_document_pages(mut self, pages: Vec<String>) -> Self {
        self.document_pages = pages;
        self
    }

    /// Hashes the descriptor into its admission identity.
    ///
    /// Covers platform, source URL, and file name so a re-resolved link maps
    /// to the same key regardless of the task id it was given.
    #[must_use]
    pub fn enqueue_key(&self) -> EnqueueKey {
        let mut hasher = Sha256::new();
        hasher.update(self.platform.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.source_url.as_bytes());
        hasher.update(b"|");
        hasher.update(self.file_name.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        EnqueueKey(hex)
    }

    /// Builds the Cookie header value from the task's session cookies.
    ///
    /// Returns `None` when the task carries no cookies.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
