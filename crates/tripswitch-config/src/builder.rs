//! Configuration builder

use crate::types::{Config, LogFormat, LoggingConfig};
use tripswitch_core::{BreakerConfig, Result};

/// Builder for constructing configuration programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    logging: LoggingConfig,
    defaults: BreakerConfig,
    breakers: Vec<BreakerConfig>,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set logging configuration
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Set log format
    pub fn log_format(mut self, format: LogFormat) -> Self {
        self.logging.format = format;
        self
    }

    /// Set settings for breakers created on demand
    pub fn defaults(mut self, defaults: BreakerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Add a named breaker
    pub fn add_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breakers.push(breaker);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        let config = Config {
            logging: self.logging,
            defaults: self.defaults,
            breakers: self.breakers,
        };

        crate::validator::validate_config(&config)?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ConfigBuilder::new()
            .log_level("debug")
            .log_format(LogFormat::Json)
            .defaults(BreakerConfig::new().with_max_failures(2))
            .add_breaker(BreakerConfig::new().with_name("payments").with_max_failures(5))
            .build()
            .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.defaults.max_failures, 2);
        assert_eq!(config.breakers.len(), 1);
    }

    #[test]
    fn test_builder_validates() {
        let result = ConfigBuilder::new()
            .add_breaker(BreakerConfig::new().with_name("a"))
            .add_breaker(BreakerConfig::new().with_name("a"))
            .build();
        assert!(result.is_err());
    }
}
