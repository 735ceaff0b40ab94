//! Drive a flaky async operation through a circuit breaker

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tripswitch_core::{keys, CircuitBreaker, CircuitState, EventKind, StatsSnapshot};

/// Result of one guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Operation completed and a success was recorded
    Succeeded(String),
    /// Breaker was open, the operation was not started
    Blocked,
    /// Operation exceeded the deadline, a failure was recorded
    TimedOut,
    /// Operation returned an error, a failure was recorded
    Failed(String),
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Succeeded(_) => "succeeded",
            Outcome::Blocked => "blocked",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed(_) => "failed",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            Outcome::Succeeded(detail) | Outcome::Failed(detail) => Some(detail.as_str()),
            Outcome::Blocked | Outcome::TimedOut => None,
        }
    }
}

/// Run `operation` under `breaker`
///
/// The breaker is consulted first; an open breaker short-circuits without creating the
/// future. A timeout counts as a failure and bumps the `timeout` counter.
pub async fn guarded<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    timeout: Option<Duration>,
    operation: F,
) -> Outcome
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    T: ToString,
    E: std::fmt::Display,
{
    if breaker.test().is_err() {
        return Outcome::Blocked;
    }

    let result = match timeout {
        Some(deadline) => match tokio::time::timeout(deadline, operation()).await {
            Ok(result) => result,
            Err(_) => {
                breaker.stats().increment(keys::TIMEOUT);
                breaker.record_failure();
                return Outcome::TimedOut;
            }
        },
        None => operation().await,
    };

    match result {
        Ok(value) => {
            breaker.record_success();
            Outcome::Succeeded(value.to_string())
        }
        Err(e) => {
            breaker.record_failure();
            Outcome::Failed(e.to_string())
        }
    }
}

/// Deterministic operation that fails for its first `fail_first` invocations
#[derive(Debug)]
pub struct FlakyOperation {
    fail_first: u32,
    latency: Duration,
    invocations: AtomicU32,
}

impl FlakyOperation {
    /// Create an operation that fails `fail_first` times, each call taking `latency`
    pub fn new(fail_first: u32, latency: Duration) -> Self {
        Self {
            fail_first,
            latency,
            invocations: AtomicU32::new(0),
        }
    }

    /// Number of times the operation actually ran
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Perform one invocation
    pub async fn call(&self) -> Result<String> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if n <= self.fail_first {
            Err(anyhow!("invocation {n} failed"))
        } else {
            Ok(format!("invocation {n} ok"))
        }
    }
}

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct Plan {
    /// Number of guarded calls to attempt
    pub calls: u32,
    /// Per-call deadline
    pub timeout: Option<Duration>,
    /// Pause between calls
    pub interval: Duration,
    /// Call `try_reset` after this many consecutive blocked calls
    pub manual_reset_after: Option<u32>,
}

/// Final state printed by `tripswitch simulate`
#[derive(Debug, Serialize)]
pub struct Report {
    /// Breaker name
    pub breaker: String,
    /// State after the last call
    pub state: CircuitState,
    /// Consecutive failure count after the last call
    pub consecutive_failures: u32,
    /// Operation invocations that were actually started
    pub invocations: u32,
    /// Calls rejected by the open breaker
    pub blocked: u32,
    /// Counter snapshot
    pub stats: StatsSnapshot,
}

/// Log every breaker event at info level
pub fn trace_events(breaker: &CircuitBreaker) {
    for kind in EventKind::ALL {
        let name = breaker.name().to_string();
        breaker.on(kind, move |event| {
            tracing::info!(
                breaker = %name,
                event = %event.kind,
                open = event.stats.open,
                executions = event.stats.executions(),
                failures = event.stats.failures(),
                "Breaker event"
            );
        });
    }
}

/// Run the plan against `operation`
pub async fn run(breaker: &CircuitBreaker, operation: &FlakyOperation, plan: &Plan) -> Report {
    let mut blocked = 0;
    let mut blocked_streak = 0;

    for call in 1..=plan.calls {
        if let Some(limit) = plan.manual_reset_after {
            if blocked_streak >= limit {
                tracing::info!(breaker = %breaker.name(), "Resetting breaker by hand");
                breaker.try_reset();
                blocked_streak = 0;
            }
        }

        let outcome = guarded(breaker, plan.timeout, || operation.call()).await;

        match &outcome {
            Outcome::Blocked => {
                blocked += 1;
                blocked_streak += 1;
            }
            _ => blocked_streak = 0,
        }

        tracing::debug!(
            call,
            outcome = outcome.label(),
            detail = outcome.detail(),
            state = %breaker.state(),
            "Call finished"
        );

        if call < plan.calls && !plan.interval.is_zero() {
            tokio::time::sleep(plan.interval).await;
        }
    }

    Report {
        breaker: breaker.name().to_string(),
        state: breaker.state(),
        consecutive_failures: breaker.consecutive_failures(),
        invocations: operation.invocations(),
        blocked,
        stats: breaker.stats().snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripswitch_core::BreakerConfig;

    fn breaker(max_failures: u32, reset_delay_ms: i64) -> CircuitBreaker {
        CircuitBreaker::new(
            BreakerConfig::new()
                .with_name("sim")
                .with_max_failures(max_failures)
                .with_reset_delay_ms(reset_delay_ms),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_skips_operation() {
        let breaker = breaker(1, 0);
        let operation = FlakyOperation::new(u32::MAX, Duration::ZERO);

        let outcome = guarded(&breaker, None, || operation.call()).await;
        assert_eq!(outcome.label(), "failed");
        assert_eq!(outcome.detail(), Some("invocation 1 failed"));
        assert_eq!(
            guarded(&breaker, None, || operation.call()).await,
            Outcome::Blocked
        );
        assert_eq!(operation.invocations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let breaker = breaker(2, 0);
        let operation = FlakyOperation::new(0, Duration::from_millis(500));

        let outcome =
            guarded(&breaker, Some(Duration::from_millis(100)), || operation.call()).await;

        assert_eq!(outcome, Outcome::TimedOut);
        assert_eq!(outcome.detail(), None);
        let stats = breaker.stats().snapshot();
        assert_eq!(stats.get(keys::TIMEOUT), 1);
        assert_eq!(stats.failures(), 1);
        assert_eq!(breaker.consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_recovers_automatically() {
        let breaker = breaker(2, 1_000);
        let operation = FlakyOperation::new(2, Duration::from_millis(10));
        let plan = Plan {
            calls: 30,
            timeout: None,
            interval: Duration::from_millis(100),
            manual_reset_after: None,
        };

        let report = run(&breaker, &operation, &plan).await;

        assert_eq!(report.state, CircuitState::Closed);
        assert!(report.blocked > 0);
        assert_eq!(report.invocations + report.blocked, 30);
        assert_eq!(report.stats.failures(), 2);
        assert!(!report.stats.open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_manual_reset() {
        let breaker = breaker(1, 0);
        let operation = FlakyOperation::new(1, Duration::ZERO);
        let plan = Plan {
            calls: 5,
            timeout: None,
            interval: Duration::ZERO,
            manual_reset_after: Some(2),
        };

        let report = run(&breaker, &operation, &plan).await;

        // fail, blocked, blocked, reset + trial success, success
        assert_eq!(report.blocked, 2);
        assert_eq!(report.invocations, 3);
        assert_eq!(report.state, CircuitState::Closed);
        assert_eq!(report.stats.successes(), 2);
    }
}
