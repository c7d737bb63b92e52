//! Persisted download records.
//!
//! The record store is a durable mirror of the per-task state machine
//! (pending → downloading → completed/failed). Only the retry supervisor
//! writes a given record; throttled progress updates land off the streaming
//! path and touch the progress column only.

mod error;
mod item;

pub use error::RecordError;
pub use item::{DownloadRecord, NewRecord, RecordStatus};

use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;

/// Result type for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`RecordError::NotFound`].
fn check_affected(id: Uuid, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(RecordError::NotFound(id.to_string()))
    } else {
        Ok(())
    }
}

/// SQLite-backed store for download records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Creates a new record store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a record with pending status.
    ///
    /// An insert with an id that already exists replaces the prior row,
    /// matching the admission controller's idempotent enqueue.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the insert fails.
    #[instrument(skip(self, record), fields(id = %record.id, link = %record.link))]
    pub async fn insert(&self, record: &NewRecord) -> Result<()> {
        sqlx::query(
            r"INSERT OR REPLACE INTO records (id, platform, link, file_name, file_type, status, progress)
              VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(&record.id)
        .bind(record.platform.as_str())
        .bind(&record.link)
        .bind(&record.file_name)
        .bind(record.file_type.as_str())
        .bind(RecordStatus::Pending.as_str())
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Transitions a record to `downloading` and resets its progress.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record exists with the id.
    #[instrument(skip(self))]
    pub async fn mark_downloading(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE records SET status = ?, progress = 0, error_message = NULL WHERE id = ?",
        )
        .bind(RecordStatus::Downloading.as_str())
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Updates the progress percentage of a downloading record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record exists with the id.
    #[instrument(skip(self), level = "debug")]
    pub async fn update_progress(&self, id: Uuid, percent: u8) -> Result<()> {
        let result = sqlx::query(r"UPDATE records SET progress = ? WHERE id = ?")
            .bind(i64::from(percent.min(100)))
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Marks a record completed with its final sink URI and size.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record exists with the id.
    #[instrument(skip(self), fields(file_uri = %file_uri))]
    pub async fn mark_completed(&self, id: Uuid, file_uri: &str, file_size: u64) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE records
              SET status = ?, progress = 100, file_uri = ?, file_size = ?,
                  error_message = NULL, completed_at = datetime('now')
              WHERE id = ?",
        )
        .bind(RecordStatus::Completed.as_str())
        .bind(file_uri)
        .bind(i64::try_from(file_size).unwrap_or(i64::MAX))
        .bind(id.to_string())
        .execute(self.db.pool())
        .await?;

        check_affected(id, result.rows_affected())
    }

    /// Marks a record failed with the error message of the last attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record exists with the id.
    #[instrument(skip(self, message))]
    pub async fn mark_failed(&self, id: Uuid, message: &str) -> Result<()> {
        let result = sqlx::query(r"UPDATE records SET status = ?, error_message = ? WHERE id = ?")
            .bind(RecordStatus::Failed.as_str())
            .bind(message)
            .bind(id.to_string())
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Fetches a single record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no record exists with the id.
    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<DownloadRecord> {
        sqlx::query_as::<_, DownloadRecord>(r"SELECT * FROM records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| RecordError::NotFound(id.to_string()))
    }

    /// Lists all records in a given status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn query_by_status(&self, status: RecordStatus) -> Result<Vec<DownloadRecord>> {
        let records = sqlx::query_as::<_, DownloadRecord>(
            r"SELECT * FROM records WHERE status = ? ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(self.db.pool())
        .await?;

        Ok(records)
    }

    /// Counts records in a given status.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn count_by_status(&self, status: RecordStatus) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(r"SELECT COUNT(*) FROM records WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(self.db.pool())
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::task::{DownloadTask, MediaKind, Platform};

    async fn store_with_task() -> (RecordStore, DownloadTask) {
        let db = Database::new_in_memory().await.unwrap();
        let store = RecordStore::new(db);
        let task = DownloadTask::new(
            "https://pbs.example.com/media/abc.jpg",
            Platform::Twitter,
            MediaKind::Photo,
            PathBuf::from("/tmp"),
            "abc.jpg",
        );
        store.insert(&NewRecord::from(&task)).await.unwrap();
        (store, task)
    }

    #[tokio::test]
    async fn test_insert_creates_pending_record() {
        let (store, task) = store_with_task().await;
        let record = store.get(task.id).await.unwrap();
        assert_eq!(record.status(), RecordStatus::Pending);
        assert_eq!(record.progress, 0);
        assert!(record.file_uri.is_none());
    }

    #[tokio::test]
    async fn test_full_success_lifecycle() {
        let (store, task) = store_with_task().await;

        store.mark_downloading(task.id).await.unwrap();
        store.update_progress(task.id, 40).await.unwrap();
        assert_eq!(store.get(task.id).await.unwrap().progress, 40);

        store
            .mark_completed(task.id, "/tmp/abc.jpg", 1024)
            .await
            .unwrap();

        let record = store.get(task.id).await.unwrap();
        assert_eq!(record.status(), RecordStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.file_uri.as_deref(), Some("/tmp/abc.jpg"));
        assert_eq!(record.file_size, Some(1024));
        assert!(record.completed_at.is_some());
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_failed_then_retried_clears_error() {
        let (store, task) = store_with_task().await;

        store.mark_downloading(task.id).await.unwrap();
        store.mark_failed(task.id, "HTTP 503").await.unwrap();

        let record = store.get(task.id).await.unwrap();
        assert_eq!(record.status(), RecordStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("HTTP 503"));

        // Retry re-enters downloading and clears the message.
        store.mark_downloading(task.id).await.unwrap();
        let record = store.get(task.id).await.unwrap();
        assert_eq!(record.status(), RecordStatus::Downloading);
        assert!(record.error_message.is_none());
    }

    #[tokio::test]
    async fn test_terminal_failure_has_message_and_no_file_uri() {
        let (store, task) = store_with_task().await;
        store.mark_downloading(task.id).await.unwrap();
        store.mark_failed(task.id, "timeout").await.unwrap();

        let record = store.get(task.id).await.unwrap();
        assert!(record.error_message.is_some());
        assert!(record.file_uri.is_none());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let (store, _task) = store_with_task().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            store.mark_downloading(missing).await,
            Err(RecordError::NotFound(_))
        ));
        assert!(matches!(
            store.get(missing).await,
            Err(RecordError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_query_and_count_by_status() {
        let (store, task) = store_with_task().await;

        let pending = store.query_by_status(RecordStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, task.id.to_string());

        assert_eq!(
            store.count_by_status(RecordStatus::Pending).await.unwrap(),
            1
        );
        assert_eq!(
            store
                .count_by_status(RecordStatus::Completed)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_reinsert_same_id_replaces_row() {
        let (store, task) = store_with_task().await;
        store.mark_downloading(task.id).await.unwrap();

        store.insert(&NewRecord::from(&task)).await.unwrap();
        let record = store.get(task.id).await.unwrap();
        assert_eq!(record.status(), RecordStatus::Pending);
    }
}
