use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::idle::WakeAnimation;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_INPUT_DIR: &str = "/dev/input";
pub const DEFAULT_EXCLUDED_DEVICE: &str = "dummy";

/// Runtime parameters of the idle monitor.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Total inactivity tolerated before the display is powered down.
    pub timeout: Duration,
    /// Spacing of the inactivity checks.
    pub check_interval: Duration,
    /// Device names that never take part in the readiness wait.
    pub excluded_devices: BTreeSet<String>,
    pub input_dir: PathBuf,
    pub wake_animation: WakeAnimation,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
            excluded_devices: BTreeSet::from([DEFAULT_EXCLUDED_DEVICE.to_string()]),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            wake_animation: WakeAnimation::EveryActivity,
        }
    }
}

impl Settings {
    pub fn validated(self) -> Result<Self, Error> {
        if self.check_interval.is_zero() {
            return Err(Error::Settings("check interval must be non-zero".into()));
        }
        if self.timeout.is_zero() {
            return Err(Error::Settings("timeout must be non-zero".into()));
        }
        Ok(self)
    }

    /// Consecutive empty checks before the display is turned off.
    ///
    /// `floor(timeout / check_interval)`, never below one: an interval longer than the
    /// timeout sleeps on the first empty check.
    pub fn max_attempts(&self) -> u32 {
        if self.check_interval.is_zero() {
            return 1;
        }
        let attempts = self.timeout.as_nanos() / self.check_interval.as_nanos();
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded_devices.contains(name)
    }
}
