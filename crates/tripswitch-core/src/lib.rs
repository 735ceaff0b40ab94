//! # Tripswitch Core
//!
//! Circuit breaker state machine for guarding calls to an unreliable operation.
//!
//! The breaker decides, before each attempt, whether a call may proceed. It never makes
//! the call itself:
//! - [`CircuitBreaker::test`] before the attempt
//! - [`CircuitBreaker::record_success`] / [`CircuitBreaker::record_failure`] after it
//! - [`CircuitBreaker::try_reset`] to force a trial call
//!
//! ```
//! use tripswitch_core::prelude::*;
//!
//! let breaker = CircuitBreaker::new(BreakerConfig::new().with_max_failures(1))?;
//! breaker.on(EventKind::Opened, |event| {
//!     println!("opened after {} failures", event.stats.failures());
//! });
//!
//! breaker.record_failure();
//! assert!(breaker.test().unwrap_err().code() == "EPERM");
//! # Ok::<(), tripswitch_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod registry;
pub mod state;
pub mod stats;
mod timer;

pub use breaker::{CircuitBreaker, Stats};
pub use config::{BreakerConfig, RecoveryMode};
pub use error::{BreakerOpenError, Error, Result};
pub use events::{BreakerEvent, EventKind, ListenerId, Notifier};
pub use registry::BreakerRegistry;
pub use state::CircuitState;
pub use stats::{keys, Counters, StatsSnapshot, COUNTER_CEILING};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::breaker::{CircuitBreaker, Stats};
    pub use crate::config::{BreakerConfig, RecoveryMode};
    pub use crate::error::{BreakerOpenError, Error, Result};
    pub use crate::events::{BreakerEvent, EventKind, ListenerId};
    pub use crate::registry::BreakerRegistry;
    pub use crate::state::CircuitState;
    pub use crate::stats::{keys, StatsSnapshot};
}
