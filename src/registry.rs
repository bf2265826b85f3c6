//! Process-wide breaker registry and snapshot broadcast (spec §5).

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, OnceLock};

use crate::stats::{Stats, TotalStats};
use std::sync::Arc;

/// A lightweight, type-erased handle the registry needs: just enough to
/// report identity and hand back a stats snapshot, never the breaker's
/// operation/fallback closures.
pub struct BreakerHandle {
    pub name: String,
    pub stats: Arc<Stats>,
}

/// A registry event: a breaker joined or left the process-wide set.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered { name: String },
    Deregistered { name: String },
    /// A registered breaker's periodic snapshot timer fired. This is the
    /// "raw feed" a dashboard adapter maps into its own wire format (spec
    /// §4.5); the registry itself never interprets the payload.
    Snapshot { name: String, stats: TotalStats },
}

/// Process-wide singleton tracking every `Breaker` constructed with
/// `register_global: true` (spec §5).
///
/// Modeled on the teacher's `std::sync::mpsc` readiness-handshake pattern:
/// a raw feed carries every registration/deregistration event verbatim,
/// so a dashboard adapter or test harness can subscribe without the
/// registry needing to know about its shape.
pub struct GlobalRegistry {
    breakers: Mutex<Vec<BreakerHandle>>,
    feed: Sender<RegistryEvent>,
    // Kept alive so `feed.send` never fails with no receivers; real
    // subscribers call `subscribe` to get their own receiver.
    _feed_sink: Mutex<Receiver<RegistryEvent>>,
    subscribers: Mutex<Vec<Sender<RegistryEvent>>>,
}

static REGISTRY: OnceLock<GlobalRegistry> = OnceLock::new();

impl GlobalRegistry {
    #[must_use]
    pub fn global() -> &'static Self {
        REGISTRY.get_or_init(Self::new)
    }

    fn new() -> Self {
        let (feed, sink) = channel();
        Self {
            breakers: Mutex::new(Vec::new()),
            feed,
            _feed_sink: Mutex::new(sink),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handle: BreakerHandle) {
        let event = RegistryEvent::Registered {
            name: handle.name.clone(),
        };
        self.breakers.lock().unwrap().push(handle);
        self.broadcast(event);
    }

    pub fn deregister(&self, name: &str) {
        self.breakers.lock().unwrap().retain(|h| h.name != name);
        self.broadcast(RegistryEvent::Deregistered {
            name: name.to_string(),
        });
    }

    /// Number of currently registered breakers (spec §5: `instanceCount`).
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.breakers.lock().unwrap().len()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.breakers
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.name.clone())
            .collect()
    }

    /// Subscribe to the raw feed: registration/deregistration lifecycle
    /// events interleaved with every registered breaker's periodic
    /// snapshots.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<RegistryEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Forward one breaker's periodic snapshot onto the raw feed. Called
    /// by a `Breaker` that subscribed to its own `Stats` snapshot event at
    /// construction time, never by the breaker's own application code.
    pub fn publish_snapshot(&self, name: &str, stats: TotalStats) {
        self.broadcast(RegistryEvent::Snapshot {
            name: name.to_string(),
            stats,
        });
    }

    fn broadcast(&self, event: RegistryEvent) {
        let _ = self.feed.send(event.clone());
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;

    fn handle(name: &str) -> BreakerHandle {
        BreakerHandle {
            name: name.to_string(),
            stats: Stats::new(&BreakerConfig::default()),
        }
    }

    #[test]
    fn register_and_deregister_update_instance_count() {
        // The registry is a process-wide singleton; scope this test to a
        // uniquely named breaker so it does not interfere with others
        // running concurrently in the same binary.
        let registry = GlobalRegistry::global();
        let before = registry.instance_count();

        registry.register(handle("registry-test-breaker"));
        assert_eq!(registry.instance_count(), before + 1);
        assert!(registry.names().contains(&"registry-test-breaker".to_string()));

        registry.deregister("registry-test-breaker");
        assert_eq!(registry.instance_count(), before);
    }

    #[test]
    fn subscribers_observe_registration_events() {
        let registry = GlobalRegistry::global();
        let rx = registry.subscribe();

        registry.register(handle("registry-test-subscriber"));
        registry.deregister("registry-test-subscriber");

        let mut saw_registered = false;
        let mut saw_deregistered = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                RegistryEvent::Registered { name } if name == "registry-test-subscriber" => {
                    saw_registered = true;
                }
                RegistryEvent::Deregistered { name } if name == "registry-test-subscriber" => {
                    saw_deregistered = true;
                }
                _ => {}
            }
        }
        assert!(saw_registered);
        assert!(saw_deregistered);
    }

    #[test]
    fn registered_breaker_forwards_its_snapshots_onto_the_raw_feed() {
        use crate::breaker::Breaker;
        use crate::circuit::BoxFuture;
        use asupersync::runtime::RuntimeBuilder;
        use std::sync::Arc;

        let registry = GlobalRegistry::global();
        let rx = registry.subscribe();

        let mut config = BreakerConfig::new("registry-test-snapshot-forward");
        config.stat_interval = std::time::Duration::from_millis(20);
        let breaker = Breaker::builder(Arc::new(|_args: ()| {
            Box::pin(async { Ok::<u32, String>(1) }) as BoxFuture<'static, Result<u32, String>>
        }))
        .config(config)
        .build()
        .unwrap();

        let runtime = RuntimeBuilder::new().build().unwrap();
        let _ = runtime.block_on(breaker.exec(()));

        let mut saw_snapshot_for_this_breaker = false;
        let deadline = std::time::Instant::now() + std::time::Duration::from_millis(500);
        while std::time::Instant::now() < deadline && !saw_snapshot_for_this_breaker {
            match rx.recv_timeout(std::time::Duration::from_millis(50)) {
                Ok(RegistryEvent::Snapshot { name, .. }) if name == "registry-test-snapshot-forward" => {
                    saw_snapshot_for_this_breaker = true;
                }
                _ => {}
            }
        }

        assert!(saw_snapshot_for_this_breaker, "expected a snapshot event forwarded from the breaker's own stats timer");
        breaker.destroy();
    }
}
