//! Outcome counters and point-in-time snapshots

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Well-known counter keys
pub mod keys {
    /// Every recorded outcome
    pub const EXECUTIONS: &str = "executions";
    /// Successes recorded while the breaker ends up closed
    pub const SUCCESSES: &str = "successes";
    /// Failures, plus successes reported while the breaker is not closed
    pub const FAILURES: &str = "failures";
    /// Reserved for the computed open flag; never stored as a counter
    pub const OPEN: &str = "open";
    /// Conventional key for failures caused by a caller-side timeout
    pub const TIMEOUT: &str = "timeout";
}

/// Largest value a counter may hold before it wraps back around
pub const COUNTER_CEILING: u64 = u64::MAX;

/// Mutable counter table
///
/// The key set is open-ended: a key that was never seen reads as 0 and starts at 0 on its
/// first increment. The reserved [`keys::OPEN`] key is ignored by every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    counts: HashMap<String, u64>,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    /// Create a table holding the standard counters at 0
    pub fn new() -> Self {
        let counts = [keys::EXECUTIONS, keys::SUCCESSES, keys::FAILURES]
            .into_iter()
            .map(|key| (key.to_string(), 0))
            .collect();
        Self { counts }
    }

    /// Add one to `key`, wrapping to 0 first if the counter sits at the ceiling
    pub fn increment(&mut self, key: &str) {
        if key == keys::OPEN {
            return;
        }

        let count = self.counts.entry(key.to_string()).or_insert(0);
        if *count == COUNTER_CEILING {
            *count = 0;
        }
        *count += 1;
    }

    /// Set `key` to 0
    pub fn reset(&mut self, key: &str) {
        if key == keys::OPEN {
            return;
        }
        self.counts.insert(key.to_string(), 0);
    }

    /// Set every known counter to 0
    pub fn reset_all(&mut self) {
        self.counts.values_mut().for_each(|count| *count = 0);
    }

    /// Current value of `key`, 0 if never incremented
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Copy the counters into a snapshot carrying the given open flag
    pub fn snapshot(&self, open: bool) -> StatsSnapshot {
        StatsSnapshot {
            open,
            counts: self
                .counts
                .iter()
                .map(|(key, count)| (key.clone(), *count))
                .collect(),
        }
    }
}

/// Immutable copy of the counters plus whether the breaker was open when it was taken
///
/// Serializes as a flat object: `{"open": false, "executions": 3, "failures": 1, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Whether the breaker was open at snapshot time
    pub open: bool,
    #[serde(flatten)]
    counts: BTreeMap<String, u64>,
}

impl StatsSnapshot {
    /// Total recorded outcomes
    pub fn executions(&self) -> u64 {
        self.get(keys::EXECUTIONS)
    }

    /// Successes counted while the breaker ended up closed
    pub fn successes(&self) -> u64 {
        self.get(keys::SUCCESSES)
    }

    /// Failures, including successes reported while the breaker was not closed
    pub fn failures(&self) -> u64 {
        self.get(keys::FAILURES)
    }

    /// Value of an arbitrary counter, 0 if absent
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Whether a counter with this key has been recorded
    pub fn contains(&self, key: &str) -> bool {
        self.counts.contains_key(key)
    }

    /// All counters, ordered by key
    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_counters_start_at_zero() {
        let counters = Counters::new();
        let snapshot = counters.snapshot(false);

        assert!(!snapshot.open);
        assert_eq!(snapshot.executions(), 0);
        assert_eq!(snapshot.successes(), 0);
        assert_eq!(snapshot.failures(), 0);
        assert_eq!(snapshot.counters().len(), 3);
    }

    #[test]
    fn test_increment_and_reset() {
        let mut counters = Counters::new();

        counters.increment(keys::SUCCESSES);
        assert_eq!(counters.get(keys::SUCCESSES), 1);
        counters.increment(keys::FAILURES);
        assert_eq!(counters.get(keys::FAILURES), 1);

        counters.reset(keys::SUCCESSES);
        assert_eq!(counters.get(keys::SUCCESSES), 0);
        assert_eq!(counters.get(keys::FAILURES), 1);

        counters.reset_all();
        assert_eq!(counters.get(keys::FAILURES), 0);
    }

    #[test]
    fn test_unknown_key_starts_at_zero() {
        let mut counters = Counters::new();
        assert_eq!(counters.get("timeouts"), 0);

        counters.increment("timeouts");
        assert_eq!(counters.get("timeouts"), 1);
        assert!(counters.snapshot(false).contains("timeouts"));
    }

    #[test]
    fn test_wraps_at_ceiling() {
        let mut counters = Counters::new();
        counters
            .counts
            .insert(keys::EXECUTIONS.to_string(), COUNTER_CEILING);

        counters.increment(keys::EXECUTIONS);
        assert_eq!(counters.get(keys::EXECUTIONS), 1);
    }

    #[test]
    fn test_open_key_is_protected() {
        let mut counters = Counters::new();

        counters.increment(keys::OPEN);
        counters.reset(keys::OPEN);

        assert!(!counters.counts.contains_key(keys::OPEN));
        assert!(!counters.snapshot(true).contains(keys::OPEN));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut counters = Counters::new();
        let before = counters.snapshot(false);

        counters.increment(keys::EXECUTIONS);

        assert_eq!(before.executions(), 0);
        assert_eq!(counters.snapshot(false).executions(), 1);
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let mut counters = Counters::new();
        counters.increment(keys::EXECUTIONS);
        counters.increment(keys::TIMEOUT);

        let json = serde_json::to_value(counters.snapshot(true)).unwrap();
        assert_eq!(json["open"], true);
        assert_eq!(json["executions"], 1);
        assert_eq!(json["timeout"], 1);
        assert_eq!(json["successes"], 0);

        let back: StatsSnapshot = serde_json::from_value(json).unwrap();
        assert!(back.open);
        assert_eq!(back.get(keys::TIMEOUT), 1);
    }
}
