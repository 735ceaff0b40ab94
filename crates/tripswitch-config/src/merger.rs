//! Configuration merging

use crate::Config;
use tripswitch_core::{Error, Result};

/// Merge configurations in order
///
/// Breakers are keyed by name: a later entry replaces an earlier one in place, new names
/// are appended. Logging and defaults are taken from the last configuration.
pub fn merge_configs(configs: Vec<Config>) -> Result<Config> {
    let mut configs = configs.into_iter();
    let mut merged = configs
        .next()
        .ok_or_else(|| Error::Config("Nothing to merge".to_string()))?;

    for config in configs {
        merged.logging = config.logging;
        merged.defaults = config.defaults;

        for breaker in config.breakers {
            match merged.breakers.iter_mut().find(|b| b.name == breaker.name) {
                Some(existing) => {
                    tracing::debug!(breaker = %breaker.name, "Overriding breaker configuration");
                    *existing = breaker;
                }
                None => merged.breakers.push(breaker),
            }
        }
    }

    Ok(merged)
}
