//! Named breakers, one per protected operation

use crate::breaker::CircuitBreaker;
use crate::config::BreakerConfig;
use crate::error::{Error, Result};
use crate::stats::StatsSnapshot;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// Registry of independent breakers keyed by name
///
/// Each entry is its own state machine; the registry only owns the handles.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    defaults: BreakerConfig,
    breakers: Arc<DashMap<String, CircuitBreaker>>,
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

impl BreakerRegistry {
    /// Create a registry whose lazily created breakers use `defaults`
    pub fn new(defaults: BreakerConfig) -> Self {
        Self {
            defaults,
            breakers: Arc::new(DashMap::new()),
        }
    }

    /// Get the breaker for `name`, creating it from the defaults if needed
    pub fn get_or_create(&self, name: &str) -> Result<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Ok(breaker.clone());
        }

        let config = self.defaults.clone().with_name(name);
        config.validate()?;

        Ok(self
            .breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(breaker = %name, "Created circuit breaker");
                CircuitBreaker::from_config(config)
            })
            .clone())
    }

    /// Register a breaker under its own name, replacing any previous one
    pub fn insert(&self, breaker: CircuitBreaker) -> Option<CircuitBreaker> {
        self.breakers.insert(breaker.name().to_string(), breaker)
    }

    /// Breaker registered under `name`
    pub fn get(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.get(name).map(|entry| entry.clone())
    }

    /// Breaker registered under `name`, or [`Error::UnknownBreaker`]
    pub fn require(&self, name: &str) -> Result<CircuitBreaker> {
        self.get(name)
            .ok_or_else(|| Error::UnknownBreaker(name.to_string()))
    }

    /// Remove and return the breaker registered under `name`
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker> {
        self.breakers.remove(name).map(|(_, breaker)| breaker)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.breakers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Stats snapshot of every breaker, sorted by name
    pub fn snapshots(&self) -> Vec<(String, StatsSnapshot)> {
        let breakers: Vec<(String, CircuitBreaker)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshots: Vec<(String, StatsSnapshot)> = breakers
            .into_iter()
            .map(|(name, breaker)| (name, breaker.stats().snapshot()))
            .collect();
        snapshots.sort_by(|a, b| a.0.cmp(&b.0));
        snapshots
    }

    /// Force every breaker into half-open
    pub fn try_reset_all(&self) {
        for breaker in self.handles() {
            breaker.try_reset();
        }
        info!("All circuit breakers reset to half-open");
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Whether no breaker is registered
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    fn handles(&self) -> Vec<CircuitBreaker> {
        self.breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}
