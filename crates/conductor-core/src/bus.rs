//! EventBus - synchronous topic pub/sub with wildcard suffix matching.
//!
//! Lifecycle topics (`sequence:*`, `movement:*`, `beat:*`) and plugin beat
//! events share one bus. Dispatch is synchronous in subscription order so
//! observers see events exactly as the executor emits them; a failing
//! listener never reaches the publisher and never stops later listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

/// Stable lifecycle topic names.
pub mod topics {
    pub const SEQUENCE_QUEUED: &str = "sequence:queued";
    pub const SEQUENCE_STARTED: &str = "sequence:started";
    pub const SEQUENCE_COMPLETED: &str = "sequence:completed";
    pub const SEQUENCE_FAILED: &str = "sequence:failed";
    pub const SEQUENCE_CANCELLED: &str = "sequence:cancelled";
    pub const MOVEMENT_STARTED: &str = "movement:started";
    pub const BEAT_STARTED: &str = "beat:started";
    pub const BEAT_COMPLETED: &str = "beat:completed";
    pub const BEAT_FAILED: &str = "beat:failed";
    /// Captured listener failures are reported here, never on the original
    /// topic.
    pub const LISTENER_ERROR: &str = "bus:listener-error";

    /// Topic prefixes reserved for runtime lifecycle events. Plugin beat
    /// events must not collide with these.
    pub const RESERVED_PREFIXES: [&str; 4] = ["sequence:", "movement:", "beat:", "bus:"];
}

/// A single event as observed by bus subscribers.
#[derive(Debug, Clone)]
pub struct BusEvent {
    pub topic: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Subscriber callback. Errors are captured by the bus, logged, and reported
/// on [`topics::LISTENER_ERROR`].
pub type Listener = dyn Fn(&BusEvent) -> Result<(), String> + Send + Sync;

/// Handle identifying one subscription. Duplicate subscriptions of the same
/// callback are independent and get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: u64,
    pattern: String,
    listener: Arc<Listener>,
}

/// In-process topic bus.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener to a topic pattern.
    ///
    /// A pattern ending in `*` matches any topic sharing the preceding
    /// prefix; any other pattern matches literally.
    pub fn subscribe<F>(&self, pattern: impl Into<String>, listener: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write().push(Subscription {
            id,
            pattern: pattern.into(),
            listener: Arc::new(listener),
        });
        SubscriptionId(id)
    }

    /// Remove a subscription. Returns false when the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.write();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id.0);
        subscriptions.len() < before
    }

    /// Emit an event to all matching listeners, synchronously, in
    /// subscription order. Emitting with no subscribers is not an error.
    pub fn emit(&self, topic: impl Into<String>, payload: Value) {
        let event = BusEvent {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
        };

        // Snapshot under the lock, dispatch outside it, so listeners may
        // subscribe or emit re-entrantly.
        let matched: Vec<Arc<Listener>> = self
            .read()
            .iter()
            .filter(|s| pattern_matches(&s.pattern, &event.topic))
            .map(|s| Arc::clone(&s.listener))
            .collect();

        for listener in matched {
            if let Err(error) = listener(&event) {
                tracing::warn!(topic = %event.topic, error = %error, "bus listener failed");
                if event.topic != topics::LISTENER_ERROR {
                    self.emit(
                        topics::LISTENER_ERROR,
                        json!({"topic": event.topic, "error": error}),
                    );
                }
            }
        }
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscription>> {
        match self.subscriptions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscription>> {
        match self.subscriptions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn pattern_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => topic.starts_with(prefix),
        None => pattern == topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder(bus: &EventBus, pattern: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(pattern, move |event: &BusEvent| {
            sink.lock().unwrap().push(event.topic.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn test_literal_subscription_matches_exact_topic() {
        let bus = EventBus::new();
        let seen = recorder(&bus, "sequence:started");

        bus.emit("sequence:started", json!({}));
        bus.emit("sequence:completed", json!({}));

        assert_eq!(*seen.lock().unwrap(), vec!["sequence:started"]);
    }

    #[test]
    fn test_wildcard_suffix_matches_prefix() {
        let bus = EventBus::new();
        let seen = recorder(&bus, "beat:*");

        bus.emit("beat:started", json!({}));
        bus.emit("beat:completed", json!({}));
        bus.emit("sequence:started", json!({}));

        assert_eq!(*seen.lock().unwrap(), vec!["beat:started", "beat:completed"]);
    }

    #[test]
    fn test_dispatch_runs_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let sink = order.clone();
            bus.subscribe("tick", move |_| {
                sink.lock().unwrap().push(tag);
                Ok(())
            });
        }

        bus.emit("tick", json!({}));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        let id = bus.subscribe("tick", move |_| {
            *sink.lock().unwrap() += 1;
            Ok(())
        });

        bus.emit("tick", json!({}));
        assert!(bus.unsubscribe(id));
        bus.emit("tick", json!({}));

        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn test_failing_listener_does_not_stop_later_listeners() {
        let bus = EventBus::new();
        bus.subscribe("tick", |_| Err("boom".to_string()));
        let seen = recorder(&bus, "tick");

        bus.emit("tick", json!({}));
        assert_eq!(*seen.lock().unwrap(), vec!["tick"]);
    }

    #[test]
    fn test_listener_error_reported_on_dedicated_topic() {
        let bus = EventBus::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        bus.subscribe(topics::LISTENER_ERROR, move |event: &BusEvent| {
            sink.lock().unwrap().push(event.payload.clone());
            Ok(())
        });
        bus.subscribe("tick", |_| Err("boom".to_string()));

        bus.emit("tick", json!({}));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["topic"], "tick");
        assert_eq!(errors[0]["error"], "boom");
    }

    #[test]
    fn test_failure_on_listener_error_topic_is_not_reemitted() {
        let bus = EventBus::new();
        bus.subscribe(topics::LISTENER_ERROR, |_| Err("meta-boom".to_string()));
        bus.subscribe("tick", |_| Err("boom".to_string()));

        // Must terminate: the listener-error failure is only logged.
        bus.emit("tick", json!({}));
    }

    #[test]
    fn test_duplicate_subscriptions_are_independent() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0usize));
        let sink_a = seen.clone();
        let first = bus.subscribe("tick", move |_| {
            *sink_a.lock().unwrap() += 1;
            Ok(())
        });
        let sink_b = seen.clone();
        bus.subscribe("tick", move |_| {
            *sink_b.lock().unwrap() += 1;
            Ok(())
        });

        bus.emit("tick", json!({}));
        assert_eq!(*seen.lock().unwrap(), 2);

        bus.unsubscribe(first);
        bus.emit("tick", json!({}));
        assert_eq!(*seen.lock().unwrap(), 3);
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.emit("tick", json!({"n": 1}));
    }
}
