//! # Tripswitch Configuration
//!
//! File-based configuration of named circuit breakers with support for:
//! - Multiple formats (YAML, TOML, JSON)
//! - Environment variable expansion (`${VAR}`, `${VAR:-default}`)
//! - Layered files merged by breaker name
//! - Validation

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod builder;
pub mod loader;
pub mod merger;
pub mod types;
pub mod validator;

pub use builder::ConfigBuilder;
pub use loader::{load_and_merge, load_config, load_from_file, load_from_str};
pub use merger::merge_configs;
pub use types::{Config, LogFormat, LoggingConfig};
pub use validator::validate_config;

use std::path::Path;
use tripswitch_core::{BreakerRegistry, CircuitBreaker, Error, Result};

/// Load configuration from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    load_from_file(path)
}

/// Load configuration from a string
pub fn load_str(content: &str, format: ConfigFormat) -> Result<Config> {
    load_from_str(content, format)
}

/// Create a registry holding one breaker per configured entry
///
/// Breakers requested later by an unconfigured name are created from `defaults`.
pub fn build_registry(config: &Config) -> Result<BreakerRegistry> {
    let registry = BreakerRegistry::new(config.defaults.clone());

    for breaker in &config.breakers {
        registry.insert(CircuitBreaker::new(breaker.clone())?);
    }

    tracing::debug!(breakers = registry.len(), "Breaker registry built");

    Ok(registry)
}

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Config("Unable to detect config format".to_string()))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::Config(format!("Unsupported config format: {}", ext))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tripswitch_core::CircuitState;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("breakers.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("breakers.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("breakers.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("breakers.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        assert!(ConfigFormat::from_path(&PathBuf::from("breakers.txt")).is_err());
        assert!(ConfigFormat::from_path(&PathBuf::from("breakers")).is_err());
    }

    #[test]
    fn test_build_registry() {
        let config = load_str(
            r#"
defaults:
  max_failures: 2
  reset_delay: 0
breakers:
  - name: "payments"
    max_failures: 1
    reset_delay: 0
"#,
            ConfigFormat::Yaml,
        )
        .unwrap();

        let registry = build_registry(&config).unwrap();
        assert_eq!(registry.names(), vec!["payments"]);

        let payments = registry.require("payments").unwrap();
        payments.record_failure();
        assert_eq!(payments.state(), CircuitState::Open);

        let adhoc = registry.get_or_create("adhoc").unwrap();
        assert_eq!(adhoc.max_failures(), 2);
        assert_eq!(registry.len(), 2);
    }
}
