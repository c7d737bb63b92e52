//! Error types for record store operations.

use thiserror::Error;

/// Errors from download record persistence.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Underlying database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No record exists for the given task id.
    #[error("record not found: {0}")]
    NotFound(String),
}
