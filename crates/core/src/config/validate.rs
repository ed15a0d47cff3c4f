use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Aggregator windows: debounce > 0, force window shorter than debounce, threshold >= 1
/// - Retry policy: multiplier >= 1, max delay >= base delay, breaker threshold >= 1
/// - Persistence: staleness bound >= save interval
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.storage.key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.key cannot be empty".to_string(),
        ));
    }

    let aggregator = &config.aggregator;
    if aggregator.debounce_ms == 0 {
        return Err(ConfigError::ValidationError(
            "aggregator.debounce_ms must be greater than 0".to_string(),
        ));
    }
    if aggregator.force_flush_ms >= aggregator.debounce_ms {
        return Err(ConfigError::ValidationError(format!(
            "aggregator.force_flush_ms ({}) must be shorter than aggregator.debounce_ms ({})",
            aggregator.force_flush_ms, aggregator.debounce_ms
        )));
    }
    if aggregator.batch_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "aggregator.batch_threshold must be at least 1".to_string(),
        ));
    }

    let retry = &config.retry;
    if retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.backoff_multiplier must be at least 1.0".to_string(),
        ));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ConfigError::ValidationError(format!(
            "retry.max_delay_ms ({}) cannot be lower than retry.base_delay_ms ({})",
            retry.max_delay_ms, retry.base_delay_ms
        )));
    }
    if retry.circuit_threshold == 0 {
        return Err(ConfigError::ValidationError(
            "retry.circuit_threshold must be at least 1".to_string(),
        ));
    }

    let persistence = &config.persistence;
    if persistence.max_staleness_ms < persistence.save_interval_ms {
        return Err(ConfigError::ValidationError(format!(
            "persistence.max_staleness_ms ({}) cannot be lower than persistence.save_interval_ms ({})",
            persistence.max_staleness_ms, persistence.save_interval_ms
        )));
    }

    Ok(())
}
