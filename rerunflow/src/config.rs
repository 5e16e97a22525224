//! Configuration of the retry service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry validation and orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Executions older than this many days cannot be retried.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Delay between polls for a compiled plan, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub plan_poll_interval_ms: u64,
    /// Upper bound on waiting for a compiled plan, in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub plan_wait_timeout_ms: u64,
    /// Whether partial parallel-group retries narrow to the failed members.
    #[serde(default = "default_only_failed")]
    pub only_failed_in_parallel_groups: bool,
}

fn default_retention_days() -> u32 {
    30
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_wait_timeout_ms() -> u64 {
    60_000
}

fn default_only_failed() -> bool {
    true
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            plan_poll_interval_ms: default_poll_interval_ms(),
            plan_wait_timeout_ms: default_wait_timeout_ms(),
            only_failed_in_parallel_groups: default_only_failed(),
        }
    }
}

impl ResumeConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retention window in days.
    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the plan poll interval.
    #[must_use]
    pub fn with_plan_poll_interval(mut self, interval: Duration) -> Self {
        self.plan_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the plan wait timeout.
    #[must_use]
    pub fn with_plan_wait_timeout(mut self, timeout: Duration) -> Self {
        self.plan_wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables or disables narrowing to failed parallel-group members.
    #[must_use]
    pub fn with_only_failed_in_parallel_groups(mut self, enabled: bool) -> Self {
        self.only_failed_in_parallel_groups = enabled;
        self
    }

    /// Returns the plan poll interval.
    #[must_use]
    pub fn plan_poll_interval(&self) -> Duration {
        Duration::from_millis(self.plan_poll_interval_ms)
    }

    /// Returns the plan wait timeout.
    #[must_use]
    pub fn plan_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.plan_wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ResumeConfig::default();
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.plan_poll_interval(), Duration::from_millis(200));
        assert_eq!(config.plan_wait_timeout(), Duration::from_secs(60));
        assert!(config.only_failed_in_parallel_groups);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ResumeConfig =
            serde_json::from_value(serde_json::json!({"retention_days": 7})).unwrap();
        assert_eq!(config.retention_days, 7);
        assert_eq!(config.plan_wait_timeout_ms, 60_000);
    }

    #[test]
    fn test_builders() {
        let config = ResumeConfig::new()
            .with_retention_days(1)
            .with_plan_poll_interval(Duration::from_millis(5))
            .with_plan_wait_timeout(Duration::from_millis(50))
            .with_only_failed_in_parallel_groups(false);
        assert_eq!(config.retention_days, 1);
        assert_eq!(config.plan_poll_interval_ms, 5);
        assert_eq!(config.plan_wait_timeout_ms, 50);
        assert!(!config.only_failed_in_parallel_groups);
    }
}
