//! Fire-and-forget user notifications.
//!
//! Notifier failures are never propagated back into the pipeline; the
//! supervisor calls these hooks and moves on.

use uuid::Uuid;

use crate::task::MediaKind;

/// Notification sink for download lifecycle events.
pub trait Notifier: Send + Sync {
    /// Reports transfer progress for a task.
    fn show_progress(&self, id: Uuid, percent: u8);

    /// Reports terminal success with the completed sink URI.
    fn show_complete(&self, id: Uuid, file_uri: &str, label: &str, kind: MediaKind);

    /// Reports a failed attempt or terminal failure.
    fn show_failed(&self, id: Uuid, message: &str);
}

/// Notifier that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_progress(&self, id: Uuid, percent: u8) {
        tracing::debug!(task_id = %id, percent, "download progress");
    }

    fn show_complete(&self, id: Uuid, file_uri: &str, label: &str, kind: MediaKind) {
        tracing::info!(task_id = %id, file_uri, label, kind = %kind, "download complete");
    }

    fn show_failed(&self, id: Uuid, message: &str) {
        tracing::warn!(task_id = %id, message, "download failed");
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CapturingNotifier;
    use super::*;

    #[test]
    fn test_capturing_notifier_records_order() {
        let notifier = CapturingNotifier::default();
        let id = Uuid::new_v4();
        notifier.show_progress(id, 10);
        notifier.show_failed(id, "HTTP 500");
        notifier.show_complete(id, "/tmp/a.mp4", "a.mp4", MediaKind::Video);

        let events = notifier.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events[0].starts_with("progress"));
        assert!(events[1].contains("HTTP 500"));
        assert!(events[2].contains("/tmp/a.mp4"));
    }
}
