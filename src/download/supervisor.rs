//! Retry and failure supervision for one task.
//!
//! The supervisor owns the task state machine: each attempt moves the record
//! to downloading, runs the transfer, and ends in completed or failed. A
//! failed attempt is retried immediately, with no backoff, until the live
//! retry budget is exhausted; only then is the failure terminal. Progress is
//! mirrored into the shared map and the notifier on every callback, and
//! persisted to the record at coarse steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::{debug, info, instrument, warn};

use super::engine::{TransferEngine, TransferOutcome};
use crate::config::SettingsHandle;
use crate::notify::Notifier;
use crate::progress::ProgressMap;
use crate::records::RecordStore;
use crate::task::DownloadTask;

/// Granularity of persisted progress during a transfer. Values are written
/// through at each step boundary, capped below 100 so only a completed
/// record ever reads full progress.
const PROGRESS_PERSIST_STEP: u8 = 10;

/// Terminal result of running one task through its retry budget.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The task finished; the sink entry was promoted.
    Completed {
        /// URI of the completed file.
        file_uri: String,
        /// Bytes written.
        bytes: u64,
    },
    /// Every attempt failed; the last error message is recorded.
    Failed {
        /// Message from the final attempt.
        message: String,
        /// Total attempts made (first try included).
        attempts: u32,
    },
}

/// Runs tasks through attempt/retry cycles against the transfer engine.
pub struct RetrySupervisor {
    engine: TransferEngine,
    records: RecordStore,
    notifier: Arc<dyn Notifier>,
    settings: SettingsHandle,
    progress: ProgressMap,
}

impl std::fmt::Debug for RetrySupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrySupervisor").finish_non_exhaustive()
    }
}

impl RetrySupervisor {
    /// Wires a supervisor over its collaborators.
    #[must_use]
    pub fn new(
        engine: TransferEngine,
        records: RecordStore,
        notifier: Arc<dyn Notifier>,
        settings: SettingsHandle,
        progress: ProgressMap,
    ) -> Self {
        Self {
            engine,
            records,
            notifier,
            settings,
            progress,
        }
    }

    /// Runs one task to a terminal outcome.
    ///
    /// Record-store failures while persisting state transitions are logged
    /// and do not abort the transfer; the persisted record is a best-effort
    /// mirror of the in-memory state machine.
    #[instrument(skip(self, task), fields(task_id = %task.id, file = %task.file_name))]
    pub async fn run(&self, task: &DownloadTask) -> TaskOutcome {
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;
            // Read the budget live so a settings change mid-run applies to
            // the next decision, not a stale snapshot from enqueue time.
            let max_retries = self.settings.snapshot().max_retries;

            self.mark_downloading(task).await;

            match self.attempt(task).await {
                Ok(outcome) => {
                    break TaskOutcome::Completed {
                        file_uri: outcome.handle.file_uri(),
                        bytes: outcome.bytes_written,
                    };
                }
                Err(error) => {
                    let message = error.to_string();
                    // Every failed attempt is persisted and announced; the
                    // record re-enters downloading if a retry follows.
                    if let Err(e) = self.records.mark_failed(task.id, &message).await {
                        warn!(error = %e, "failed to persist failed record");
                    }
                    if self.notifications_enabled() {
                        self.notifier.show_failed(task.id, &message);
                    }
                    if attempts > max_retries {
                        break TaskOutcome::Failed { message, attempts };
                    }
                    warn!(attempt = attempts, error = %message, "attempt failed, retrying");
                }
            }
        };

        match &outcome {
            TaskOutcome::Completed { file_uri, bytes } => {
                info!(file_uri = %file_uri, bytes, attempts, "task completed");
                if let Err(e) = self.records.mark_completed(task.id, file_uri, *bytes).await {
                    warn!(error = %e, "failed to persist completed record");
                }
                self.progress.set(task.id, 100);
                if self.notifications_enabled() {
                    self.notifier
                        .show_complete(task.id, file_uri, &task.file_name, task.media_kind);
                }
            }
            TaskOutcome::Failed { message, attempts } => {
                // Per-attempt persistence and notification already happened
                // inside the loop. The progress entry stays at its last
                // value so a late reader still sees where the task stalled.
                warn!(error = %message, attempts, "task failed terminally");
            }
        }

        outcome
    }

    /// One attempt: downloading state, transfer with mirrored progress.
    ///
    /// Every callback updates the in-memory map; the record row is written
    /// through only at `PROGRESS_PERSIST_STEP` boundaries, off the streaming
    /// path, since the callback itself cannot await.
    async fn attempt(
        &self,
        task: &DownloadTask,
    ) -> Result<TransferOutcome, super::DownloadError> {
        let notify = self.notifications_enabled();
        let last_persisted = AtomicU8::new(0);
        let on_progress = |percent: u8| {
            self.progress.set(task.id, percent);
            if notify {
                self.notifier.show_progress(task.id, percent);
            }

            let step = (percent.min(99) / PROGRESS_PERSIST_STEP) * PROGRESS_PERSIST_STEP;
            if step > 0 && last_persisted.fetch_max(step, Ordering::Relaxed) < step {
                let records = self.records.clone();
                let id = task.id;
                tokio::spawn(async move {
                    if let Err(error) = records.update_progress(id, step).await {
                        debug!(error = %error, "failed to persist progress");
                    }
                });
            }
        };
        self.engine.transfer(task, &on_progress).await
    }

    async fn mark_downloading(&self, task: &DownloadTask) {
        self.progress.set(task.id, 0);
        if let Err(e) = self.records.mark_downloading(task.id).await {
            warn!(error = %e, "failed to persist downloading record");
        }
    }

    fn notifications_enabled(&self) -> bool {
        self.settings.snapshot().notifications_enabled
    }
}
