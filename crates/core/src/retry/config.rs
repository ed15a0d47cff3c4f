//! Retry coordinator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retries, backoff and the per-key circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Growth factor applied per retry.
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay (milliseconds).
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Consecutive failures after which the circuit opens.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,

    /// How long an open circuit rejects calls (milliseconds).
    #[serde(default = "default_circuit_cooldown")]
    pub circuit_cooldown_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_circuit_threshold() -> u32 {
    3
}

fn default_circuit_cooldown() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            backoff_multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
            circuit_threshold: default_circuit_threshold(),
            circuit_cooldown_ms: default_circuit_cooldown(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt + 1`:
    /// `min(base * multiplier^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    pub fn circuit_cooldown(&self) -> Duration {
        Duration::from_millis(self.circuit_cooldown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.circuit_threshold, 3);
        assert_eq!(config.circuit_cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_sequence() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (0..3)
            .map(|attempt| config.delay_for_attempt(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000]);
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(30_000));
        assert_eq!(config.delay_for_attempt(60), Duration::from_millis(30_000));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_millis(30_000));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            max_retries = 5
            base_delay_ms = 200
            backoff_multiplier = 3.0
            max_delay_ms = 5000
            circuit_threshold = 2
            circuit_cooldown_ms = 10000
        "#;
        let config: RetryConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(600));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.circuit_threshold, 2);
    }
}
