//! Breaker states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through normally
    #[default]
    Closed,
    /// Calls are short-circuited
    Open,
    /// A trial call decides whether to close or reopen
    HalfOpen,
}

impl CircuitState {
    /// Whether calls should be blocked in this state
    pub fn is_open(self) -> bool {
        self == CircuitState::Open
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}
