//! Configuration validation

use crate::Config;
use std::collections::HashSet;
use std::time::Duration;
use tripswitch_core::{Error, RecoveryMode, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_logging(config)?;

    validate_defaults(config)?;

    validate_breakers(config)?;

    Ok(())
}

fn validate_logging(config: &Config) -> Result<()> {
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(Error::Config(format!(
            "Invalid log level: {} (must be one of {})",
            config.logging.level,
            LOG_LEVELS.join(", ")
        )));
    }

    Ok(())
}

fn validate_defaults(config: &Config) -> Result<()> {
    if config.defaults.max_failures == 0 {
        return Err(Error::Config("defaults: max_failures must be > 0".to_string()));
    }

    Ok(())
}

fn validate_breakers(config: &Config) -> Result<()> {
    let mut seen = HashSet::new();

    for breaker in &config.breakers {
        breaker.validate()?;

        if !seen.insert(breaker.name.as_str()) {
            return Err(Error::Config(format!(
                "Duplicate breaker name: {}",
                breaker.name
            )));
        }

        match breaker.recovery_mode() {
            RecoveryMode::Automatic(delay) if delay > Duration::from_secs(600) => {
                tracing::warn!(
                    breaker = %breaker.name,
                    reset_delay_secs = delay.as_secs(),
                    "reset_delay is very high (>10 minutes)"
                );
            }
            RecoveryMode::Manual => {
                tracing::info!(
                    breaker = %breaker.name,
                    "Automatic recovery disabled; breaker needs try_reset() once open"
                );
            }
            RecoveryMode::Automatic(_) => {}
        }
    }

    Ok(())
}
