//! Hierarchical publish/subscribe for classified events.
//!
//! Topics are dot-separated (`wu.connected`, `ctrl.error`). Subscription
//! patterns are matched segment by segment:
//!
//! - a literal segment matches itself,
//! - `*` matches exactly one segment,
//! - `**` matches zero or more segments.
//!
//! Delivery is synchronous: [`EventBus::publish`] returns once every
//! matching subscriber has been handed the event, in registration order.
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! let mut wireless = bus.subscribe("wu.*");
//! bus.publish("wu.connected", json!({ "mac": "aa:bb" }));
//! let event = wireless.try_recv().unwrap();
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde_json::Value;
use tokio::sync::mpsc;

// ── BusEvent ─────────────────────────────────────────────────────────

/// An event as seen by subscribers.
#[derive(Debug, Clone)]
pub struct BusEvent {
    /// Concrete topic the event was published under.
    pub topic: String,
    /// Raw payload; shared between all subscribers of one publish.
    pub payload: Arc<Value>,
}

// ── Pattern ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Multi,
}

/// A parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('.')
            .map(|s| match s {
                "*" => Segment::Single,
                "**" => Segment::Multi,
                lit => Segment::Literal(lit.to_owned()),
            })
            .collect();
        Self { segments }
    }

    /// Whether `topic` falls under this pattern.
    pub fn matches(&self, topic: &str) -> bool {
        let parts: Vec<&str> = topic.split('.').collect();
        matches_from(&self.segments, &parts)
    }
}

fn matches_from(pattern: &[Segment], topic: &[&str]) -> bool {
    match (pattern.split_first(), topic.split_first()) {
        (None, None) => true,
        (Some((Segment::Multi, rest)), _) => {
            // Try every possible number of consumed segments, shortest first.
            (0..=topic.len()).any(|skip| matches_from(rest, &topic[skip..]))
        }
        (Some((Segment::Single, rest)), Some((_, tail))) => matches_from(rest, tail),
        (Some((Segment::Literal(lit), rest)), Some((head, tail))) => {
            lit == head && matches_from(rest, tail)
        }
        _ => false,
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Literal(lit) => f.write_str(lit)?,
                Segment::Single => f.write_str("*")?,
                Segment::Multi => f.write_str("**")?,
            }
        }
        Ok(())
    }
}

// ── Subscriptions ────────────────────────────────────────────────────

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    pattern: Pattern,
    handler: Handler,
}

type Subscribers = RwLock<Vec<Subscriber>>;

fn remove(subscribers: &Subscribers, id: SubscriptionId) -> bool {
    let mut subscribers = subscribers.write().unwrap_or_else(PoisonError::into_inner);
    let before = subscribers.len();
    subscribers.retain(|s| s.id != id);
    subscribers.len() != before
}

/// Channel-backed subscription returned by [`EventBus::subscribe`].
///
/// Events are queued unbounded; the bus never blocks on a slow reader.
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<BusEvent>,
    bus: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next matching event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.bus.upgrade() {
            remove(&subscribers, self.id);
        }
    }
}

// ── EventBus ─────────────────────────────────────────────────────────

/// Wildcard-capable publish/subscribe hub.
///
/// Cheap to clone; clones share the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every topic matching `pattern`.
    ///
    /// The callback runs inline on the publishing task and must not block.
    pub fn on<F>(&self, pattern: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Subscriber {
            id,
            pattern: Pattern::parse(pattern),
            handler: Arc::new(handler),
        };
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        tracing::trace!(pattern, ?id, "subscribed");
        id
    }

    /// Subscribe with a channel instead of a callback.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(pattern, move |event| {
            // Receiver gone but not yet unregistered: a publish raced the drop.
            let _ = tx.send(event.clone());
        });
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.subscribers),
        }
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove(&self.subscribers, id)
    }

    /// Deliver `payload` under `topic` to every matching subscriber.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, topic: &str, payload: Value) -> usize {
        // Snapshot handlers so callbacks may (un)subscribe without deadlocking.
        let handlers: Vec<Handler> = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.pattern.matches(topic))
            .map(|s| Arc::clone(&s.handler))
            .collect();

        if handlers.is_empty() {
            tracing::trace!(topic, "no subscribers");
            return 0;
        }

        let event = BusEvent {
            topic: topic.to_owned(),
            payload: Arc::new(payload),
        };
        for handler in &handlers {
            handler(&event);
        }
        handlers.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn literal_pattern_matches_exact_topic() {
        let p = Pattern::parse("wu.connected");
        assert!(p.matches("wu.connected"));
        assert!(!p.matches("wu.disconnected"));
        assert!(!p.matches("wu"));
        assert!(!p.matches("wu.connected.extra"));
    }

    #[test]
    fn single_wildcard_matches_one_segment() {
        let p = Pattern::parse("wu.*");
        assert!(p.matches("wu.connected"));
        assert!(p.matches("wu.roam"));
        assert!(!p.matches("lu.connected"));
        assert!(!p.matches("wu"));
        assert!(!p.matches("wu.a.b"));

        let leading = Pattern::parse("*.connected");
        assert!(leading.matches("wu.connected"));
        assert!(leading.matches("lu.connected"));
    }

    #[test]
    fn multi_wildcard_matches_subtrees() {
        let all = Pattern::parse("**");
        assert!(all.matches("wu.connected"));
        assert!(all.matches("ctrl.error"));

        let ctrl = Pattern::parse("ctrl.**");
        assert!(ctrl.matches("ctrl.connected"));
        assert!(ctrl.matches("ctrl"));
        assert!(!ctrl.matches("wu.connected"));

        let inner = Pattern::parse("a.**.z");
        assert!(inner.matches("a.z"));
        assert!(inner.matches("a.b.c.z"));
        assert!(!inner.matches("a.b.c"));
    }

    #[test]
    fn pattern_display_round_trips() {
        for raw in ["wu.*", "ctrl.**", "a.b.c"] {
            assert_eq!(Pattern::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn delivery_follows_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, pattern) in [("exact", "wu.connected"), ("group", "wu.*"), ("all", "**")] {
            let order = Arc::clone(&order);
            bus.on(pattern, move |_| order.lock().unwrap().push(label));
        }

        let delivered = bus.publish("wu.connected", json!({}));
        assert_eq!(delivered, 3);
        assert_eq!(*order.lock().unwrap(), vec!["exact", "group", "all"]);
    }

    #[test]
    fn channel_subscription_receives_payload() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("wu.*");
        let mut other = bus.subscribe("lu.*");

        bus.publish("wu.connected", json!({ "mac": "aa:bb" }));

        let event = sub.try_recv().unwrap();
        assert_eq!(event.topic, "wu.connected");
        assert_eq!(*event.payload, json!({ "mac": "aa:bb" }));
        assert!(sub.try_recv().is_none());
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("**");

        assert!(bus.unsubscribe(sub.id()));
        assert!(!bus.unsubscribe(sub.id()));
        assert_eq!(bus.publish("wu.connected", Value::Null), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn dropped_subscriptions_unregister() {
        let bus = EventBus::new();
        for _ in 0..1000 {
            drop(bus.subscribe("wu.*"));
        }
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish("wu.connected", Value::Null), 0);

        let kept = bus.subscribe("wu.*");
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_may_outlive_the_bus() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("**");
        bus.publish("wu.connected", Value::Null);
        drop(bus);

        assert_eq!(sub.try_recv().unwrap().topic, "wu.connected");
        drop(sub);
    }

    #[test]
    fn handler_may_subscribe_during_publish() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.on("ctrl.connected", move |_| {
            inner.on("wu.*", |_| {});
        });

        bus.publish("ctrl.connected", Value::Null);
        assert_eq!(bus.subscriber_count(), 2);
    }
}
