//! Front door of the download pipeline.
//!
//! `submit` runs the environment preflight, persists the record, and hands
//! the task to the admission controller. Admitted tasks run on their own
//! spawned worker; when a worker finishes it promotes the next pending task
//! in place, so the active set stays full without a central dispatch loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::{debug, instrument};

use super::admission::AdmissionController;
use super::preflight::{self, EnvironmentProbe};
use super::supervisor::{RetrySupervisor, TaskOutcome};
use super::DownloadError;
use crate::config::SettingsHandle;
use crate::records::{NewRecord, RecordError, RecordStore};
use crate::task::DownloadTask;

/// Errors refusing a task at submission time.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// An environment precondition failed; nothing was persisted.
    #[error(transparent)]
    Precondition(#[from] DownloadError),

    /// The record could not be persisted; the task was not enqueued.
    #[error(transparent)]
    Records(#[from] RecordError),
}

struct SchedulerInner {
    admission: AdmissionController,
    supervisor: RetrySupervisor,
    records: RecordStore,
    probe: Box<dyn EnvironmentProbe>,
    settings: SettingsHandle,
    in_flight: AtomicUsize,
    failed: AtomicUsize,
    idle: Notify,
}

/// Accepts tasks and drives them to terminal outcomes.
///
/// Cheap to clone; all clones share the same admission state and workers.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Wires a scheduler over its collaborators.
    #[must_use]
    pub fn new(
        admission: AdmissionController,
        supervisor: RetrySupervisor,
        records: RecordStore,
        probe: Box<dyn EnvironmentProbe>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                admission,
                supervisor,
                records,
                probe,
                settings,
                in_flight: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Submits one task to the pipeline.
    ///
    /// Returns `true` when the task started immediately and `false` when it
    /// was parked pending a free slot. Either way the task is persisted as a
    /// pending record before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] when an environment precondition fails or the
    /// record cannot be persisted; refused tasks never reach the admission
    /// controller.
    #[instrument(skip(self, task), fields(task_id = %task.id, file = %task.file_name))]
    pub async fn submit(&self, task: DownloadTask) -> Result<bool, SubmitError> {
        preflight::check_preconditions(
            self.inner.probe.as_ref(),
            &self.inner.settings,
            &task.dest_dir,
        )?;

        self.inner.records.insert(&NewRecord::from(&task)).await?;

        let admitted = self.inner.admission.enqueue(task.clone());
        if admitted {
            self.spawn_worker(task);
        } else {
            debug!("task parked pending a free slot");
        }
        Ok(admitted)
    }

    /// Promotes any pending tasks into free slots and starts workers for
    /// them.
    ///
    /// Call after raising the concurrency limit to put the new headroom to
    /// work immediately.
    pub fn resume_pending(&self) {
        for task in self.inner.admission.drain_promotable() {
            self.spawn_worker(task);
        }
    }

    /// Waits until no workers are in flight.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of tasks that ended in terminal failure so far.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.inner.failed.load(Ordering::Acquire)
    }

    /// Number of tasks currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.admission.active_count()
    }

    /// Number of tasks waiting for a slot.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.admission.pending_count()
    }

    /// Runs a task on its own worker; on completion the worker promotes the
    /// next pending task in place and keeps going until no promotion is due.
    fn spawn_worker(&self, task: DownloadTask) {
        let inner = Arc::clone(&self.inner);
        inner.in_flight.fetch_add(1, Ordering::AcqRel);
        tokio::spawn(async move {
            let mut current = task;
            loop {
                let outcome = inner.supervisor.run(&current).await;
                if matches!(outcome, TaskOutcome::Failed { .. }) {
                    inner.failed.fetch_add(1, Ordering::AcqRel);
                }
                let key = current.enqueue_key();
                match inner.admission.mark_complete(&key) {
                    Some(next) => current = next,
                    None => break,
                }
            }
            if inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                inner.idle.notify_waiters();
            }
        });
    }
}
