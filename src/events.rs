//! Event taxonomy for breaker/stats activity.
//!
//! Modeled on the teacher's `tui_events.rs`: a flat enum describing every
//! observable transition, fanned out to subscribers through an
//! `Arc<Mutex<Vec<_>>>` listener registry rather than a full pub/sub
//! broker. Consumers that want filtering or backpressure can wrap a
//! listener themselves; this module only guarantees delivery order per
//! breaker.

use std::sync::{Arc, Mutex};

use crate::stats::TotalStats;

/// Lifecycle and outcome events emitted by a single `Breaker`/`Circuit`.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// An invocation started.
    Exec,
    /// An invocation completed successfully within the deadline.
    Success { run_time_ms: u32 },
    /// An invocation returned an operation error (not a timeout).
    Failure {
        run_time_ms: u32,
        message: String,
        generation: u64,
    },
    /// An invocation exceeded its deadline.
    Timeout {
        run_time_ms: u32,
        generation: u64,
    },
    /// The breaker transitioned from closed to open.
    CircuitOpen,
    /// The breaker transitioned from open/half-open back to closed.
    CircuitClosed,
    /// A health-check probe failed while healing.
    HealthCheckFailed { message: String },
}

/// Aggregate-statistics events emitted by a single `Stats` window.
#[derive(Debug, Clone)]
pub enum StatsEvent {
    /// A new bucket was rotated in or counters were recorded; carries the
    /// freshly computed aggregate.
    Update(TotalStats),
    /// The periodic snapshot timer fired; carries the current aggregate.
    Snapshot(TotalStats),
}

/// A simple broadcast registry: every call to `notify` is delivered,
/// synchronously, to every currently registered listener, in registration
/// order.
pub struct Listeners<T> {
    subscribers: Mutex<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<T> Listeners<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Arc::new(listener));
    }

    pub fn notify(&self, event: &T) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for subscriber in subscribers {
            subscriber(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every subscriber. Used by `Breaker::destroy` so a destroyed
    /// breaker's subsequent `exec` calls still resolve but reach no
    /// listener.
    pub fn clear(&self) {
        self.subscribers.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn notifies_every_subscriber_in_order() {
        let listeners: Listeners<BreakerEvent> = Listeners::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let a = Arc::clone(&seen);
        listeners.subscribe(move |_event| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        let b = Arc::clone(&seen);
        listeners.subscribe(move |_event| {
            b.fetch_add(10, Ordering::SeqCst);
        });

        listeners.notify(&BreakerEvent::Exec);
        assert_eq!(seen.load(Ordering::SeqCst), 11);
        assert_eq!(listeners.len(), 2);
    }

    #[test]
    fn clear_removes_every_subscriber() {
        let listeners: Listeners<BreakerEvent> = Listeners::new();
        listeners.subscribe(|_event| {});
        listeners.subscribe(|_event| {});
        assert_eq!(listeners.len(), 2);

        listeners.clear();
        assert!(listeners.is_empty());

        let seen = Arc::new(AtomicUsize::new(0));
        listeners.notify(&BreakerEvent::Exec);
        assert_eq!(seen.load(Ordering::SeqCst), 0, "no subscriber left to notify");
    }
}
