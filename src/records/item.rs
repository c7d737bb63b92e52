//! Download record types and status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::task::{DownloadTask, MediaKind, Platform};

/// Status of a download record.
///
/// Transitions only `Pending → Downloading → {Completed | Failed}`; a failed
/// record re-enters `Downloading` while retries remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created, waiting for an admission slot.
    Pending,
    /// A transfer attempt is running.
    Downloading,
    /// Terminal success.
    Completed,
    /// Failed; terminal once the retry budget is exhausted.
    Failed,
}

impl RecordStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid record status: {s}")),
        }
    }
}

/// Persisted mirror of one task's state machine.
///
/// The record is never deleted by the core; deletion is an external
/// operation.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRecord {
    /// Task id (UUID, stored as text).
    pub id: String,
    /// Source platform (stored as text, parsed via `platform()`).
    #[sqlx(rename = "platform")]
    pub platform_str: String,
    /// Original resolved link.
    pub link: String,
    /// Preferred file name.
    pub file_name: String,
    /// Media kind (stored as text, parsed via `file_type()`).
    #[sqlx(rename = "file_type")]
    pub file_type_str: String,
    /// Final size in bytes when known.
    pub file_size: Option<i64>,
    /// Current status (stored as text, parsed via `status()`).
    #[sqlx(rename = "status")]
    pub status_str: String,
    /// Progress percentage 0-100.
    pub progress: i64,
    /// Last error message, set on every failed attempt.
    pub error_message: Option<String>,
    /// When the record was created.
    pub created_at: String,
    /// When the download completed, if it did.
    pub completed_at: Option<String>,
    /// URI of the completed sink entry.
    pub file_uri: Option<String>,
}

impl DownloadRecord {
    /// Returns the parsed status enum.
    ///
    /// Falls back to `Pending` if the status string is invalid.
    #[must_use]
    pub fn status(&self) -> RecordStatus {
        self.status_str.parse().unwrap_or(RecordStatus::Pending)
    }

    /// Returns the parsed platform, if valid.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        self.platform_str.parse().ok()
    }

    /// Returns the parsed media kind, if valid.
    #[must_use]
    pub fn file_type(&self) -> Option<MediaKind> {
        self.file_type_str.parse().ok()
    }
}

impl fmt::Display for DownloadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadRecord {{ id: {}, link: {}, status: {} }}",
            self.id,
            self.link,
            self.status()
        )
    }
}

/// Field set inserted when a task is created.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Task id.
    pub id: String,
    /// Source platform.
    pub platform: Platform,
    /// Original resolved link.
    pub link: String,
    /// Preferred file name.
    pub file_name: String,
    /// Media kind.
    pub file_type: MediaKind,
}

impl From<&DownloadTask> for NewRecord {
    fn from(task: &DownloadTask) -> Self {
        Self {
            id: task.id.to_string(),
            platform: task.platform,
            link: task.source_url.clone(),
            file_name: task.file_name.clone(),
            file_type: task.media_kind,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn sample_record(status: &str) -> DownloadRecord {
        DownloadRecord {
            id: "a0000000-0000-0000-0000-000000000001".to_string(),
            platform_str: "lofter".to_string(),
            link: "https://blog.example.com/post/1".to_string(),
            file_name: "post_1.jpg".to_string(),
            file_type_str: "photo".to_string(),
            file_size: None,
            status_str: status.to_string(),
            progress: 0,
            error_message: None,
            created_at: "2026-01-01 00:00:00".to_string(),
            completed_at: None,
            file_uri: None,
        }
    }

    #[test]
    fn test_record_status_roundtrip() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::Downloading,
            RecordStatus::Completed,
            RecordStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_record_status_from_str_invalid() {
        assert!("paused".parse::<RecordStatus>().is_err());
    }

    #[test]
    fn test_record_status_fallback_on_invalid() {
        assert_eq!(sample_record("garbage").status(), RecordStatus::Pending);
    }

    #[test]
    fn test_record_parses_platform_and_kind() {
        let record = sample_record("downloading");
        assert_eq!(record.platform().unwrap(), Platform::Lofter);
        assert_eq!(record.file_type().unwrap(), MediaKind::Photo);
        assert_eq!(record.status(), RecordStatus::Downloading);
    }

    #[test]
    fn test_new_record_from_task() {
        let task = DownloadTask::new(
            "https://video.example.com/v.mp4",
            Platform::Weibo,
            MediaKind::Video,
            PathBuf::from("/tmp"),
            "v.mp4",
        );
        let new_record = NewRecord::from(&task);
        assert_eq!(new_record.id, task.id.to_string());
        assert_eq!(new_record.platform, Platform::Weibo);
        assert_eq!(new_record.file_type, MediaKind::Video);
        assert_eq!(new_record.link, task.source_url);
    }

    #[test]
    fn test_record_display() {
        let record = sample_record("pending");
        let display = record.to_string();
        assert!(display.contains("blog.example.com"));
        assert!(display.contains("pending"));
    }
}
