//! Environmental preconditions checked before a task is admitted.
//!
//! These checks short-circuit `submit` without ever reaching the transfer
//! engine: no network, Wi-Fi-only policy violations, and insufficient free
//! space all refuse the task up front.

use std::path::Path;

use crate::config::SettingsHandle;
use crate::download::DownloadError;

/// Minimum free bytes required at the destination before admitting a task.
pub const MIN_FREE_SPACE_BYTES: u64 = 50 * 1024 * 1024;

/// Source of environmental facts the preflight checks consult.
///
/// The system implementation is deliberately optimistic where the platform
/// offers no portable signal; tests inject fakes to exercise each refusal.
pub trait EnvironmentProbe: Send + Sync {
    /// Whether any network connectivity is available.
    fn network_available(&self) -> bool;

    /// Whether the current connection is Wi-Fi (or equivalent unmetered).
    fn wifi_connected(&self) -> bool;

    /// Free bytes at the destination, when the platform can report it.
    fn available_space(&self, dest: &Path) -> Option<u64>;
}

/// Default probe for desktop environments.
///
/// Network state is assumed present (a dead link surfaces as a transfer
/// error with retries) and connections are treated as unmetered; free space
/// is unknown and therefore not enforced.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn network_available(&self) -> bool {
        true
    }

    fn wifi_connected(&self) -> bool {
        true
    }

    fn available_space(&self, _dest: &Path) -> Option<u64> {
        None
    }
}

/// Validates the environment for a new task.
///
/// # Errors
///
/// Returns [`DownloadError::NoNetwork`], [`DownloadError::WifiRequired`], or
/// [`DownloadError::InsufficientSpace`] when the corresponding precondition
/// fails.
pub fn check_preconditions(
    probe: &dyn EnvironmentProbe,
    settings: &SettingsHandle,
    dest: &Path,
) -> Result<(), DownloadError> {
    if !probe.network_available() {
        return Err(DownloadError::NoNetwork);
    }

    let snapshot = settings.snapshot();
    if snapshot.wifi_only && !probe.wifi_connected() {
        return Err(DownloadError::WifiRequired);
    }

    if let Some(available) = probe.available_space(dest)
        && available < MIN_FREE_SPACE_BYTES
    {
        return Err(DownloadError::InsufficientSpace {
            required: MIN_FREE_SPACE_BYTES,
            available,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    struct FakeProbe {
        network: bool,
        wifi: bool,
        space: Option<u64>,
    }

    impl EnvironmentProbe for FakeProbe {
        fn network_available(&self) -> bool {
            self.network
        }

        fn wifi_connected(&self) -> bool {
            self.wifi
        }

        fn available_space(&self, _dest: &Path) -> Option<u64> {
            self.space
        }
    }

    fn dest() -> PathBuf {
        PathBuf::from("/tmp/downloads")
    }

    #[test]
    fn test_all_clear_passes() {
        let probe = FakeProbe {
            network: true,
            wifi: true,
            space: Some(u64::MAX),
        };
        let settings = SettingsHandle::default();
        assert!(check_preconditions(&probe, &settings, &dest()).is_ok());
    }

    #[test]
    fn test_no_network_refuses() {
        let probe = FakeProbe {
            network: false,
            wifi: true,
            space: None,
        };
        let settings = SettingsHandle::default();
        assert!(matches!(
            check_preconditions(&probe, &settings, &dest()),
            Err(DownloadError::NoNetwork)
        ));
    }

    #[test]
    fn test_wifi_only_refuses_on_cellular() {
        let probe = FakeProbe {
            network: true,
            wifi: false,
            space: None,
        };
        let settings = SettingsHandle::default();
        settings.update(|s| s.wifi_only = true);
        assert!(matches!(
            check_preconditions(&probe, &settings, &dest()),
            Err(DownloadError::WifiRequired)
        ));
    }

    #[test]
    fn test_wifi_only_disabled_allows_cellular() {
        let probe = FakeProbe {
            network: true,
            wifi: false,
            space: None,
        };
        let settings = SettingsHandle::default();
        assert!(check_preconditions(&probe, &settings, &dest()).is_ok());
    }

    #[test]
    fn test_low_space_refuses() {
        let probe = FakeProbe {
            network: true,
            wifi: true,
            space: Some(1024),
        };
        let settings = SettingsHandle::default();
        let result = check_preconditions(&probe, &settings, &dest());
        assert!(matches!(
            result,
            Err(DownloadError::InsufficientSpace { available: 1024, .. })
        ));
    }

    #[test]
    fn test_unknown_space_is_not_enforced() {
        let probe = FakeProbe {
            network: true,
            wifi: true,
            space: None,
        };
        let settings = SettingsHandle::default();
        assert!(check_preconditions(&probe, &settings, &dest()).is_ok());
    }

    #[test]
    fn test_system_probe_is_optimistic() {
        let probe = SystemProbe;
        assert!(probe.network_available());
        assert!(probe.wifi_connected());
        assert!(probe.available_space(&dest()).is_none());
    }
}
