//! Admission controller bounding concurrent downloads.
//!
//! Tasks are keyed by their [`EnqueueKey`]; re-enqueueing a key overwrites
//! the stored task instead of duplicating it. At most `max_concurrent_downloads`
//! (read live from settings) tasks are active at once; the rest wait in a
//! pending set ordered by priority (descending) then enqueue sequence
//! (ascending). Completing an active task promotes the best pending one.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::SettingsHandle;
use crate::task::{DownloadTask, EnqueueKey};

struct PendingEntry {
    task: DownloadTask,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    active: HashMap<EnqueueKey, DownloadTask>,
    pending: HashMap<EnqueueKey, PendingEntry>,
    next_seq: u64,
}

/// Bounds how many tasks run at once and orders the overflow.
pub struct AdmissionController {
    settings: SettingsHandle,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController").finish_non_exhaustive()
    }
}

impl AdmissionController {
    /// Creates a controller reading its concurrency limit from `settings`.
    #[must_use]
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            settings,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Enqueues a task, returning `true` when it was admitted as active and
    /// `false` when it was parked as pending.
    ///
    /// A task whose key is already active replaces the stored task in place
    /// and reports active; a key already pending is overwritten and stays
    /// pending. The concurrency limit is read live, so raising it mid-run
    /// admits new arrivals immediately.
    pub fn enqueue(&self, task: DownloadTask) -> bool {
        let key = task.enqueue_key();
        let limit = self.settings.snapshot().max_concurrent_downloads;
        let mut inner = self.lock();

        if inner.active.contains_key(&key) {
            debug!(task_id = %task.id, "re-enqueue of active task, replacing in place");
            inner.active.insert(key, task);
            return true;
        }

        if let Some(entry) = inner.pending.get_mut(&key) {
            debug!(task_id = %task.id, "re-enqueue of pending task, overwriting");
            entry.task = task;
            return false;
        }

        if inner.active.len() < limit {
            inner.active.insert(key, task);
            true
        } else {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.pending.insert(key, PendingEntry { task, seq });
            false
        }
    }

    /// Retires an active task and promotes the best pending one, if any.
    ///
    /// The promoted task is moved into the active set and returned so the
    /// caller can start running it. Pending order is priority descending,
    /// ties broken by enqueue sequence ascending.
    pub fn mark_complete(&self, key: &EnqueueKey) -> Option<DownloadTask> {
        let mut inner = self.lock();
        if inner.active.remove(key).is_none() {
            warn!("mark_complete for a key that was not active");
        }

        let limit = self.settings.snapshot().max_concurrent_downloads;
        if inner.active.len() >= limit {
            return None;
        }

        let next_key = inner
            .pending
            .iter()
            .min_by_key(|(_, e)| (std::cmp::Reverse(e.task.priority), e.seq))
            .map(|(k, _)| k.clone())?;
        let entry = inner.pending.remove(&next_key)?;
        let task = entry.task.clone();
        inner.active.insert(next_key, entry.task);
        Some(task)
    }

    /// Promotes pending tasks into any free active slots.
    ///
    /// Used after the concurrency limit is raised or at startup when resuming
    /// persisted pending work.
    pub fn drain_promotable(&self) -> Vec<DownloadTask> {
        let limit = self.settings.snapshot().max_concurrent_downloads;
        let mut inner = self.lock();
        let mut promoted = Vec::new();

        while inner.active.len() < limit && !inner.pending.is_empty() {
            let Some(next_key) = inner
                .pending
                .iter()
                .min_by_key(|(_, e)| (std::cmp::Reverse(e.task.priority), e.seq))
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            let Some(entry) = inner.pending.remove(&next_key) else {
                break;
            };
            promoted.push(entry.task.clone());
            inner.active.insert(next_key, entry.task);
        }

        promoted
    }

    /// Number of tasks currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    /// Number of tasks waiting for a slot.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner holds plain maps; a poisoned lock only means another thread
        // panicked mid-update, and the maps are still structurally sound.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
