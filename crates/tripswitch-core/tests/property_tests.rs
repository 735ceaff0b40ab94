//! Property-based tests for the breaker state machine

use proptest::prelude::*;
use tripswitch_core::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Failure,
    Success,
    TryReset,
    Custom(&'static str),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Failure),
        3 => Just(Op::Success),
        1 => Just(Op::TryReset),
        1 => prop_oneof![Just("timeout"), Just("open"), Just("rejected")].prop_map(Op::Custom),
    ]
}

/// Straight-line model of the transition table
#[derive(Debug, Default)]
struct Model {
    state: CircuitState,
    consecutive: u32,
    executions: u64,
    successes: u64,
    failures: u64,
}

impl Model {
    fn apply(&mut self, op: &Op, max_failures: u32) {
        match op {
            Op::Failure => {
                self.consecutive += 1;
                if self.state == CircuitState::HalfOpen || self.consecutive >= max_failures {
                    self.state = CircuitState::Open;
                    self.consecutive = 0;
                }
                self.executions += 1;
                self.failures += 1;
            }
            Op::Success => {
                self.consecutive = 0;
                if self.state == CircuitState::HalfOpen {
                    self.state = CircuitState::Closed;
                }
                self.executions += 1;
                if self.state == CircuitState::Closed {
                    self.successes += 1;
                } else {
                    self.failures += 1;
                }
            }
            Op::TryReset => self.state = CircuitState::HalfOpen,
            Op::Custom(_) => {}
        }
    }
}

fn manual_breaker(max_failures: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        BreakerConfig::new()
            .with_max_failures(max_failures)
            .with_reset_delay_ms(0),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn opens_exactly_on_nth_failure(max_failures in 1u32..50) {
        let cb = manual_breaker(max_failures);

        for _ in 1..max_failures {
            cb.record_failure();
            prop_assert!(cb.is_closed());
            prop_assert!(cb.test().is_ok());
        }

        cb.record_failure();
        prop_assert!(cb.is_open());
        prop_assert!(cb.test().is_err());
        prop_assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn follows_transition_table(
        max_failures in 1u32..6,
        ops in proptest::collection::vec(op(), 0..64),
    ) {
        let cb = manual_breaker(max_failures);
        let mut model = Model::default();

        for op in &ops {
            match op {
                Op::Failure => cb.record_failure(),
                Op::Success => cb.record_success(),
                Op::TryReset => cb.try_reset(),
                Op::Custom(key) => cb.stats().increment(key),
            }
            model.apply(op, max_failures);

            let snapshot = cb.stats().snapshot();
            prop_assert_eq!(cb.state(), model.state);
            prop_assert_eq!(snapshot.open, cb.is_open());
            prop_assert_eq!(cb.test().is_err(), model.state == CircuitState::Open);
            prop_assert_eq!(cb.consecutive_failures(), model.consecutive);
            prop_assert_eq!(snapshot.executions(), model.executions);
            prop_assert_eq!(snapshot.successes(), model.successes);
            prop_assert_eq!(snapshot.failures(), model.failures);
            prop_assert!(!snapshot.contains(keys::OPEN));
        }
    }
}
