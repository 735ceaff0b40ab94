//! Synchronous breaker event notifications
//!
//! Listeners are registered per [`EventKind`] and invoked on the emitting thread, in
//! registration order. Emission copies the listener list before calling anything, so a
//! listener may register or remove listeners (or call back into the breaker) without
//! deadlocking. A panicking listener is logged and skipped; the remaining listeners still run.

use crate::stats::StatsSnapshot;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Kinds of breaker events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Breaker transitioned to open
    Opened,
    /// Breaker transitioned to half-open
    HalfOpened,
    /// Breaker transitioned to closed
    Closed,
    /// A success was recorded and the breaker is closed
    Succeeded,
    /// A failure was recorded, or a success while the breaker was not closed
    Failed,
}

impl EventKind {
    /// Every event kind
    pub const ALL: [EventKind; 5] = [
        EventKind::Opened,
        EventKind::HalfOpened,
        EventKind::Closed,
        EventKind::Succeeded,
        EventKind::Failed,
    ];

    /// Event name
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Opened => "opened",
            EventKind::HalfOpened => "half_opened",
            EventKind::Closed => "closed",
            EventKind::Succeeded => "succeeded",
            EventKind::Failed => "failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An emitted event with the stats snapshot taken when it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerEvent {
    /// What happened
    pub kind: EventKind,
    /// Counters at the moment of emission
    pub stats: StatsSnapshot,
}

impl BreakerEvent {
    /// Create an event
    pub fn new(kind: EventKind, stats: StatsSnapshot) -> Self {
        Self { kind, stats }
    }
}

/// Handle identifying a registered listener, used to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&BreakerEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

/// Callback registry keyed by event kind
pub struct Notifier {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<Registration>>>,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<EventKind, usize> = listeners
            .iter()
            .map(|(kind, registered)| (*kind, registered.len()))
            .collect();
        f.debug_struct("Notifier").field("listeners", &counts).finish()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create an empty notifier
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register `callback` for every future `kind` event
    pub fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(callback))
    }

    /// Register `callback` for the next `kind` event only
    pub fn once<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(callback))
    }

    fn register(&self, kind: EventKind, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push(Registration { id, once, callback });
        id
    }

    /// Unregister a listener; returns whether it was registered for `kind`
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(registered) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|registration| registration.id != id);
        before != registered.len()
    }

    /// Remove every listener for `kind`, or for all kinds when `None`
    pub fn remove_all(&self, kind: Option<EventKind>) {
        let mut listeners = self.listeners.lock();
        match kind {
            Some(kind) => {
                listeners.remove(&kind);
            }
            None => listeners.clear(),
        }
    }

    /// Number of listeners registered for `kind`
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .get(&kind)
            .map_or(0, |registered| registered.len())
    }

    /// Deliver `event` to its listeners; returns how many were invoked
    pub fn emit(&self, event: &BreakerEvent) -> usize {
        let callbacks: Vec<(ListenerId, Callback)> = {
            let mut listeners = self.listeners.lock();
            let Some(registered) = listeners.get_mut(&event.kind) else {
                return 0;
            };
            let callbacks = registered
                .iter()
                .map(|registration| (registration.id, Arc::clone(&registration.callback)))
                .collect();
            registered.retain(|registration| !registration.once);
            callbacks
        };

        for (id, callback) in &callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                error!(
                    event = %event.kind,
                    listener = id.0,
                    panic = panic_message(payload.as_ref()),
                    "Breaker event listener panicked"
                );
            }
        }

        callbacks.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: EventKind) -> BreakerEvent {
        BreakerEvent::new(kind, StatsSnapshot::default())
    }

    #[test]
    fn test_event_names() {
        let names: Vec<&str> = EventKind::ALL.iter().map(|kind| kind.as_str()).collect();
        assert_eq!(
            names,
            vec!["opened", "half_opened", "closed", "succeeded", "failed"]
        );
        assert_eq!(EventKind::HalfOpened.to_string(), "half_opened");
    }

    #[test]
    fn test_registration_order() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            notifier.on(EventKind::Opened, move |_| seen.lock().push(n));
        }

        assert_eq!(notifier.emit(&event(EventKind::Opened)), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_kinds_are_independent() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        notifier.on(EventKind::Closed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notifier.emit(&event(EventKind::Opened)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        notifier.emit(&event(EventKind::Closed));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_fires_once() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        notifier.once(EventKind::Failed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(notifier.listener_count(EventKind::Failed), 1);

        notifier.emit(&event(EventKind::Failed));
        notifier.emit(&event(EventKind::Failed));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.listener_count(EventKind::Failed), 0);
    }

    #[test]
    fn test_off_and_remove_all() {
        let notifier = Notifier::new();
        let id = notifier.on(EventKind::Succeeded, |_| {});
        notifier.on(EventKind::Succeeded, |_| {});
        notifier.on(EventKind::Failed, |_| {});

        assert!(!notifier.off(EventKind::Failed, id));
        assert!(notifier.off(EventKind::Succeeded, id));
        assert!(!notifier.off(EventKind::Succeeded, id));
        assert_eq!(notifier.listener_count(EventKind::Succeeded), 1);

        notifier.remove_all(Some(EventKind::Succeeded));
        assert_eq!(notifier.listener_count(EventKind::Succeeded), 0);
        assert_eq!(notifier.listener_count(EventKind::Failed), 1);

        notifier.remove_all(None);
        assert_eq!(notifier.listener_count(EventKind::Failed), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let notifier = Notifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        notifier.on(EventKind::Opened, |_| panic!("listener blew up"));
        let counter = Arc::clone(&hits);
        notifier.on(EventKind::Opened, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(notifier.emit(&event(EventKind::Opened)), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_register_during_emit() {
        let notifier = Arc::new(Notifier::new());

        let inner = Arc::clone(&notifier);
        notifier.on(EventKind::Closed, move |_| {
            inner.on(EventKind::Closed, |_| {});
        });

        assert_eq!(notifier.emit(&event(EventKind::Closed)), 1);
        assert_eq!(notifier.listener_count(EventKind::Closed), 2);
    }

    #[test]
    fn test_payload_is_delivered() {
        let notifier = Notifier::new();
        let seen = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&seen);
        notifier.on(EventKind::Failed, move |event| {
            *slot.lock() = Some(event.stats.open);
        });

        let mut stats = crate::stats::Counters::new();
        stats.increment("failures");
        notifier.emit(&BreakerEvent::new(EventKind::Failed, stats.snapshot(true)));

        assert_eq!(*seen.lock(), Some(true));
    }
}
