//! Configuration types

use serde::{Deserialize, Serialize};
use std::fmt;
use tripswitch_core::BreakerConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Settings for breakers created on demand by name
    #[serde(default)]
    pub defaults: BreakerConfig,

    /// Named breakers
    #[serde(default)]
    pub breakers: Vec<BreakerConfig>,
}

impl Config {
    /// Configured breaker with the given name
    pub fn breaker(&self, name: &str) -> Option<&BreakerConfig> {
        self.breakers.iter().find(|breaker| breaker.name == name)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}
