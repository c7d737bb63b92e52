//! Shared per-task progress bookkeeping.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

/// Concurrent map from task id to progress percentage.
///
/// Written by the supervisor after every chunk callback, read by progress
/// UIs. Entries persist after completion (at 100) or terminal failure so a
/// late reader still sees the final value; callers may clear entries they no
/// longer need.
#[derive(Debug, Default, Clone)]
pub struct ProgressMap {
    inner: Arc<DashMap<Uuid, u8>>,
}

impl ProgressMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the progress percentage for a task (clamped to 100).
    pub fn set(&self, id: Uuid, percent: u8) {
        self.inner.insert(id, percent.min(100));
    }

    /// Returns the last reported percentage for a task.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<u8> {
        self.inner.get(&id).map(|entry| *entry)
    }

    /// Removes a task's entry.
    pub fn remove(&self, id: Uuid) {
        self.inner.remove(&id);
    }

    /// Number of tracked tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// True when no task is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
