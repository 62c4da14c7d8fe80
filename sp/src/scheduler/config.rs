//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Base spacing between two operations of the same class, in milliseconds
    #[serde(rename = "delay-ms", default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Cost charged to the pacing queue by every retried attempt
    #[serde(rename = "retry-cost-multiplier", default = "default_retry_cost_multiplier")]
    pub retry_cost_multiplier: u32,

    /// Attempts per logical call before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget for one logical call, retries included
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Log pacing delays and cache hits at info level
    #[serde(default)]
    pub verbose: bool,

    /// Retry every remote error, not only transient ones
    #[serde(rename = "retry-all-errors", default)]
    pub retry_all_errors: bool,
}

fn default_delay_ms() -> u64 {
    200
}

fn default_retry_cost_multiplier() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    60
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            retry_cost_multiplier: default_retry_cost_multiplier(),
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
            verbose: false,
            retry_all_errors: false,
        }
    }
}

impl SchedulerConfig {
    /// Get the pacing interval as a Duration
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Get the per-call budget as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.delay_ms, 200);
        assert_eq!(config.retry_cost_multiplier, 10);
        assert_eq!(config.max_attempts, 60);
        assert_eq!(config.timeout_ms, 120_000);
        assert!(!config.verbose);
        assert!(!config.retry_all_errors);
    }

    #[test]
    fn test_durations() {
        let config = SchedulerConfig {
            delay_ms: 50,
            timeout_ms: 3_000,
            ..Default::default()
        };
        assert_eq!(config.delay(), Duration::from_millis(50));
        assert_eq!(config.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "delay-ms: 500\nretry-all-errors: true\n";
        let config: SchedulerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.delay_ms, 500);
        assert!(config.retry_all_errors);
        assert_eq!(config.max_attempts, 60);
        assert_eq!(config.timeout_ms, 120_000);
    }
}
