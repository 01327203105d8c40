use sgsync_config::SyncSettings;
use std::time::Duration;

/// Delay before the next scheduled sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    interval: Duration,
    base: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(interval: Duration, base: Duration, max: Duration) -> Self {
        Self { interval, base, max }
    }

    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(
            Duration::from_secs(settings.sync_interval_minutes * 60),
            Duration::from_secs(settings.backoff_base_minutes * 60),
            Duration::from_secs(settings.backoff_max_minutes * 60),
        )
    }

    /// The regular delay after a successful run.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// `base * 2^(failures - 1)`, capped at `max`.
    pub fn retry_delay(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(31);
        let factor = 2u32.pow(exponent);
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}
