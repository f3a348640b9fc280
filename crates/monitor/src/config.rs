use std::time::Duration;

/// Timing of a drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Total time to keep polling before declaring the machines unchanged.
    pub check_duration: Duration,
    /// Pause between two full passes over the baseline.
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { check_duration: Duration::from_secs(600), poll_interval: Duration::from_secs(20) }
    }
}

impl MonitorConfig {
    pub fn new(check_duration: Duration, poll_interval: Duration) -> Self {
        Self { check_duration, poll_interval }
    }

    /// Defaults overridden by `SIDECHECK_CHECK_DURATION_SECS` and `SIDECHECK_POLL_INTERVAL_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let secs = |key: &str| get(key).and_then(|s| s.trim().parse::<u64>().ok()).map(Duration::from_secs);
        let d = Self::default();
        Self {
            check_duration: secs("SIDECHECK_CHECK_DURATION_SECS").unwrap_or(d.check_duration),
            poll_interval: secs("SIDECHECK_POLL_INTERVAL_SECS").unwrap_or(d.poll_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_ten_minutes_every_twenty_seconds() {
        let c = MonitorConfig::default();
        assert_eq!(c.check_duration, Duration::from_secs(600));
        assert_eq!(c.poll_interval, Duration::from_secs(20));
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let c = MonitorConfig::from_lookup(|k| match k {
            "SIDECHECK_CHECK_DURATION_SECS" => Some("90".into()),
            "SIDECHECK_POLL_INTERVAL_SECS" => Some("soon".into()),
            _ => None,
        });
        assert_eq!(c.check_duration, Duration::from_secs(90));
        assert_eq!(c.poll_interval, Duration::from_secs(20));
    }
}
