//! Breaker configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Name used in logs and as the registry key
    #[serde(default = "default_name")]
    pub name: String,

    /// Consecutive failures that open a closed breaker
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Time spent open before moving to half-open; zero disables automatic recovery
    ///
    /// Accepts milliseconds (`10000`, `0`, `-1`) or a humantime string (`"10s"`).
    #[serde(default = "default_reset_delay", with = "reset_delay")]
    pub reset_delay: Duration,
}

fn default_name() -> String {
    "circuit-breaker".to_string()
}

fn default_max_failures() -> u32 {
    3
}

fn default_reset_delay() -> Duration {
    Duration::from_millis(10_000)
}

fn delay_from_millis(ms: i64) -> Duration {
    u64::try_from(ms)
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            max_failures: default_max_failures(),
            reset_delay: default_reset_delay(),
        }
    }
}

impl BreakerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the breaker name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the consecutive-failure threshold
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Set the reset delay; [`Duration::ZERO`] selects manual recovery
    pub fn with_reset_delay(mut self, reset_delay: Duration) -> Self {
        self.reset_delay = reset_delay;
        self
    }

    /// Set the reset delay in milliseconds; values `<= 0` select manual recovery
    pub fn with_reset_delay_ms(mut self, reset_delay_ms: i64) -> Self {
        self.reset_delay = delay_from_millis(reset_delay_ms);
        self
    }

    /// How an open breaker gets back to half-open
    pub fn recovery_mode(&self) -> RecoveryMode {
        if self.reset_delay.is_zero() {
            RecoveryMode::Manual
        } else {
            RecoveryMode::Automatic(self.reset_delay)
        }
    }

    /// Check the configuration can drive a breaker
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("breaker name cannot be empty".to_string()));
        }

        if self.max_failures == 0 {
            return Err(Error::Config(format!(
                "breaker '{}': max_failures must be > 0",
                self.name
            )));
        }

        Ok(())
    }
}

/// Recovery behavior of an open breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryMode {
    /// Move to half-open after the delay elapses
    Automatic(Duration),
    /// Stay open until [`CircuitBreaker::try_reset`](crate::CircuitBreaker::try_reset)
    Manual,
}

mod reset_delay {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(i64),
        Human(#[serde(with = "humantime_serde")] Duration),
    }

    pub(super) fn serialize<S>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime_serde::serialize(delay, serializer)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => super::delay_from_millis(ms),
            Repr::Human(delay) => delay,
        })
    }
}
