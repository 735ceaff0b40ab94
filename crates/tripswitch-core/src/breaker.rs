//! Circuit breaker state machine
//!
//! # State Transitions
//! ```text
//! Closed → Open: max_failures consecutive failures
//! Open → Half-Open: reset delay elapses (automatic mode) or try_reset()
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails
//! any → Half-Open: try_reset()
//! ```
//!
//! The breaker never performs the guarded call. Callers follow a three-step protocol:
//! [`CircuitBreaker::test`] before the attempt, then [`CircuitBreaker::record_success`] or
//! [`CircuitBreaker::record_failure`] once it resolves.
//!
//! Automatic recovery runs on a tokio timer task. Without a runtime the breaker records
//! a deadline instead and half-opens on the first call that observes it has passed.
//!
//! State lives behind a short mutex so the recovery timer task can reach it. The lock is
//! never held while listeners run. Protocol calls from several tasks are not coordinated
//! beyond that: serializing trial calls in half-open is up to the caller.

use crate::config::{BreakerConfig, RecoveryMode};
use crate::error::{BreakerOpenError, Result};
use crate::events::{BreakerEvent, EventKind, ListenerId, Notifier};
use crate::state::CircuitState;
use crate::stats::{keys, Counters, StatsSnapshot};
use crate::timer::RecoveryTimer;
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Circuit breaker guarding one downstream operation
///
/// Cloning yields another handle to the same breaker. The pending recovery timer is
/// cancelled when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    config: BreakerConfig,
    runtime: Option<Handle>,
    inner: Mutex<Inner>,
    notifier: Notifier,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    counters: Counters,
    timer: Option<RecoveryTimer>,
    deadline: Option<Instant>,
    epoch: u64,
}

impl Inner {
    fn snapshot(&self) -> StatsSnapshot {
        self.counters.snapshot(self.state.is_open())
    }

    fn event(&self, kind: EventKind) -> BreakerEvent {
        BreakerEvent::new(kind, self.snapshot())
    }

    fn cancel_timer(&mut self) {
        self.timer = None;
        self.deadline = None;
    }

    fn recovery_due(&self) -> bool {
        self.state == CircuitState::Open
            && self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(BreakerConfig::default())
    }
}

impl CircuitBreaker {
    /// Create a breaker, rejecting an invalid configuration
    ///
    /// The tokio runtime current at construction (if any) is remembered and used for the
    /// recovery timer when the breaker opens outside of a runtime context.
    pub fn new(config: BreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config(config))
    }

    pub(crate) fn from_config(config: BreakerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runtime: Handle::try_current().ok(),
                inner: Mutex::new(Inner {
                    state: CircuitState::Closed,
                    consecutive_failures: 0,
                    counters: Counters::new(),
                    timer: None,
                    deadline: None,
                    epoch: 0,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Check whether a call may proceed
    ///
    /// Returns [`BreakerOpenError`] only while the breaker is open. Closed and half-open
    /// breakers let the call through. Apart from applying a recovery deadline that has
    /// already passed, this never changes any state.
    pub fn test(&self) -> std::result::Result<(), BreakerOpenError> {
        if self.state().is_open() {
            Err(BreakerOpenError)
        } else {
            Ok(())
        }
    }

    /// Record a failed call
    ///
    /// A half-open breaker reopens immediately. A breaker reaching `max_failures`
    /// consecutive failures opens. The failure is counted and a `failed` event emitted in
    /// every state, including when the breaker was already open.
    pub fn record_failure(&self) {
        let mut events = Vec::with_capacity(2);
        {
            let mut inner = self.shared.lock(&mut events);
            inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

            if inner.state == CircuitState::HalfOpen
                || inner.consecutive_failures >= self.shared.config.max_failures
            {
                self.shared.open(&mut inner, &mut events);
            }

            inner.counters.increment(keys::EXECUTIONS);
            inner.counters.increment(keys::FAILURES);

            debug!(
                breaker = %self.shared.config.name,
                state = %inner.state,
                consecutive_failures = inner.consecutive_failures,
                failures = inner.counters.get(keys::FAILURES),
                "Circuit breaker recorded failure"
            );
            events.push(inner.event(EventKind::Failed));
        }
        self.shared.dispatch(&events);
    }

    /// Record a successful call
    ///
    /// A half-open breaker closes. The success only counts as a success if the breaker is
    /// closed afterwards; reported while open it is counted, and announced, as a failure.
    pub fn record_success(&self) {
        let mut events = Vec::with_capacity(2);
        {
            let mut inner = self.shared.lock(&mut events);
            inner.consecutive_failures = 0;

            if inner.state == CircuitState::HalfOpen {
                self.shared.close(&mut inner, &mut events);
            }

            inner.counters.increment(keys::EXECUTIONS);
            let kind = if inner.state == CircuitState::Closed {
                inner.counters.increment(keys::SUCCESSES);
                EventKind::Succeeded
            } else {
                inner.counters.increment(keys::FAILURES);
                EventKind::Failed
            };

            debug!(
                breaker = %self.shared.config.name,
                state = %inner.state,
                executions = inner.counters.get(keys::EXECUTIONS),
                outcome = %kind,
                "Circuit breaker recorded success"
            );
            events.push(inner.event(kind));
        }
        self.shared.dispatch(&events);
    }

    /// Cancel any pending recovery and move to half-open, whatever the current state
    pub fn try_reset(&self) {
        let mut events = Vec::with_capacity(1);
        {
            let mut inner = self.shared.lock(&mut events);
            inner.cancel_timer();
            self.shared.half_open(&mut inner, &mut events);
        }
        self.shared.dispatch(&events);
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.shared.with_inner(|inner| inner.state)
    }

    /// Whether calls are currently blocked
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Whether the breaker is closed
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Whether the breaker is waiting on a trial call
    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Failures recorded since the last success or opening
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.with_inner(|inner| inner.consecutive_failures)
    }

    /// Whether an automatic recovery is currently scheduled
    pub fn has_pending_recovery(&self) -> bool {
        self.shared
            .with_inner(|inner| inner.timer.is_some() || inner.deadline.is_some())
    }

    /// Breaker name
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Consecutive-failure threshold
    pub fn max_failures(&self) -> u32 {
        self.shared.config.max_failures
    }

    /// Configured reset delay; zero in manual mode
    pub fn reset_delay(&self) -> Duration {
        self.shared.config.reset_delay
    }

    /// How this breaker recovers from open
    pub fn recovery_mode(&self) -> RecoveryMode {
        self.shared.config.recovery_mode()
    }

    /// Configuration the breaker was built with
    pub fn config(&self) -> &BreakerConfig {
        &self.shared.config
    }

    /// Access the outcome counters
    pub fn stats(&self) -> Stats<'_> {
        Stats {
            shared: &self.shared,
        }
    }

    /// Event registry of this breaker
    pub fn events(&self) -> &Notifier {
        &self.shared.notifier
    }

    /// Register a listener for every future `kind` event
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.shared.notifier.on(kind, callback)
    }

    /// Register a listener for the next `kind` event only
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.shared.notifier.once(kind, callback)
    }

    /// Unregister a listener; returns whether it was registered
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.notifier.off(kind, id)
    }
}

impl Shared {
    /// Lock the state, first applying a lapsed recovery deadline
    fn lock(&self, events: &mut Vec<BreakerEvent>) -> MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock();
        if inner.recovery_due() {
            inner.cancel_timer();
            self.half_open(&mut inner, events);
        }
        inner
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut events = Vec::new();
        let result = f(&mut self.lock(&mut events));
        self.dispatch(&events);
        result
    }

    fn dispatch(&self, events: &[BreakerEvent]) {
        for event in events {
            self.notifier.emit(event);
        }
    }

    fn open(self: &Arc<Self>, inner: &mut Inner, events: &mut Vec<BreakerEvent>) {
        inner.cancel_timer();
        inner.state = CircuitState::Open;
        inner.consecutive_failures = 0;

        warn!(breaker = %self.config.name, "Circuit breaker transitioned to OPEN");
        events.push(inner.event(EventKind::Opened));

        if let RecoveryMode::Automatic(delay) = self.config.recovery_mode() {
            self.arm(inner, delay);
        }
    }

    fn arm(self: &Arc<Self>, inner: &mut Inner, delay: Duration) {
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            inner.deadline = Some(Instant::now() + delay);
            debug!(
                breaker = %self.config.name,
                delay_ms = delay.as_millis() as u64,
                "No tokio runtime available; recovery deadline set"
            );
            return;
        };

        inner.epoch = inner.epoch.wrapping_add(1);
        let epoch = inner.epoch;
        let shared: Weak<Shared> = Arc::downgrade(self);

        inner.timer = Some(RecoveryTimer::spawn(&runtime, delay, epoch, move || {
            if let Some(shared) = shared.upgrade() {
                shared.recover(epoch);
            }
        }));

        debug!(
            breaker = %self.config.name,
            delay_ms = delay.as_millis() as u64,
            "Recovery timer armed"
        );
    }

    fn recover(&self, epoch: u64) {
        let mut events = Vec::with_capacity(1);
        {
            let mut inner = self.inner.lock();
            let armed = inner.timer.as_ref().map(RecoveryTimer::epoch) == Some(epoch);
            if !armed || inner.state != CircuitState::Open {
                return;
            }
            inner.cancel_timer();
            self.half_open(&mut inner, &mut events);
        }
        self.dispatch(&events);
    }

    fn half_open(&self, inner: &mut Inner, events: &mut Vec<BreakerEvent>) {
        inner.state = CircuitState::HalfOpen;
        info!(breaker = %self.config.name, "Circuit breaker transitioned to HALF-OPEN");
        events.push(inner.event(EventKind::HalfOpened));
    }

    fn close(&self, inner: &mut Inner, events: &mut Vec<BreakerEvent>) {
        inner.cancel_timer();
        inner.state = CircuitState::Closed;
        info!(breaker = %self.config.name, "Circuit breaker transitioned to CLOSED");
        events.push(inner.event(EventKind::Closed));
    }
}

/// Handle to a breaker's outcome counters
///
/// Collaborators use it to read snapshots and to record their own categorized outcomes,
/// such as [`keys::TIMEOUT`].
#[derive(Debug, Clone, Copy)]
pub struct Stats<'a> {
    shared: &'a Shared,
}

impl Stats<'_> {
    /// Add one to `key`; the reserved `open` key is ignored
    pub fn increment(&self, key: &str) {
        self.shared.with_inner(|inner| inner.counters.increment(key));
    }

    /// Set `key` to 0
    pub fn reset(&self, key: &str) {
        self.shared.with_inner(|inner| inner.counters.reset(key));
    }

    /// Set every counter to 0
    pub fn reset_all(&self) {
        self.shared.with_inner(|inner| inner.counters.reset_all());
    }

    /// Current value of `key`
    pub fn get(&self, key: &str) -> u64 {
        self.shared.with_inner(|inner| inner.counters.get(key))
    }

    /// Copy of all counters with the breaker's open flag as of now
    pub fn snapshot(&self) -> StatsSnapshot {
        self.shared.with_inner(|inner| inner.snapshot())
    }
}
