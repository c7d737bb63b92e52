//! Live pipeline settings shared across the download loops.
//!
//! The admission controller, supervisor, and crawlers read a fresh snapshot
//! at the start of each loop iteration rather than caching values, so a
//! settings change takes effect on the next iteration of every running loop.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default bound on concurrently running transfers.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default retry budget beyond the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between crawler pages.
pub const DEFAULT_INTER_PAGE_DELAY: Duration = Duration::from_secs(2);

/// Pipeline configuration values.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bound on concurrently running transfers.
    pub max_concurrent_downloads: usize,
    /// Additional transfer attempts after the first failure.
    pub max_retries: u32,
    /// Sleep between crawler page fetches.
    pub inter_page_delay: Duration,
    /// Whether the notifier is invoked at all.
    pub notifications_enabled: bool,
    /// Refuse new tasks unless on Wi-Fi.
    pub wifi_only: bool,
    /// Destination directory for sinks.
    pub download_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_retries: DEFAULT_MAX_RETRIES,
            inter_page_delay: DEFAULT_INTER_PAGE_DELAY,
            notifications_enabled: true,
            wifi_only: false,
            download_dir: PathBuf::from("./downloads"),
        }
    }
}

/// Shared handle over mutable settings.
///
/// Cheap to clone; readers take a snapshot, writers mutate in place.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<Settings>>,
}

impl SettingsHandle {
    /// Wraps an initial settings value.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Returns a point-in-time copy of the current settings.
    ///
    /// Loops must call this at the top of each iteration instead of holding
    /// onto an old snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Settings {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Applies a mutation to the live settings.
    pub fn update<F: FnOnce(&mut Settings)>(&self, mutate: F) {
        if let Ok(mut guard) = self.inner.write() {
            mutate(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrent_downloads, 3);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.inter_page_delay, Duration::from_secs(2));
        assert!(settings.notifications_enabled);
        assert!(!settings.wifi_only);
    }

    #[test]
    fn test_update_is_visible_to_later_snapshots() {
        let handle = SettingsHandle::default();
        let before = handle.snapshot();
        assert_eq!(before.max_concurrent_downloads, 3);

        handle.update(|s| s.max_concurrent_downloads = 7);

        let after = handle.snapshot();
        assert_eq!(after.max_concurrent_downloads, 7);
        // The earlier snapshot is unaffected.
        assert_eq!(before.max_concurrent_downloads, 3);
    }

    #[test]
    fn test_clone_shares_state() {
        let handle = SettingsHandle::default();
        let clone = handle.clone();
        clone.update(|s| s.max_retries = 9);
        assert_eq!(handle.snapshot().max_retries, 9);
    }
}
