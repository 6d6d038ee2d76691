//! Typed event bus.
//!
//! `publish` is non-blocking and fans out synchronously in registration
//! order: the subscriber list is snapshotted under the lock, the lock is
//! released, then handlers run. A handler error is logged and isolated —
//! it never stops delivery to later subscribers.
//!
//! For async consumers there is a `tokio::sync::broadcast` bridge
//! ([`EventBus::watch_all`]); slow receivers lag rather than blocking the
//! publisher.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use maestro_core::events::PlanEvent;
use maestro_core::ids::PlanId;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Boxed subscriber error.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&PlanEvent) -> Result<(), HandlerError> + Send + Sync>;

/// What a subscriber wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Only events for one plan.
    Plan(PlanId),
}

impl EventFilter {
    fn matches(&self, event: &PlanEvent) -> bool {
        match self {
            Self::All => true,
            Self::Plan(id) => event.plan_id() == id,
        }
    }
}

struct Subscriber {
    id: u64,
    filter: EventFilter,
    handler: Handler,
}

struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    broadcast: broadcast::Sender<PlanEvent>,
    next_id: AtomicU64,
    publish_count: AtomicU64,
}

/// Synchronous fan-out event bus with an async broadcast bridge.
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default broadcast capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a custom broadcast capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                broadcast: tx,
                next_id: AtomicU64::new(0),
                publish_count: AtomicU64::new(0),
            }),
        }
    }

    /// Register a handler. Handlers fire in registration order. Dropping
    /// the returned [`Subscription`] removes the handler.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> Subscription
    where
        F: Fn(&PlanEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.lock().push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Publish an event to all matching subscribers and the broadcast
    /// bridge. Non-blocking; returns the number of sync handlers invoked.
    pub fn publish(&self, event: &PlanEvent) -> usize {
        let _ = self.inner.publish_count.fetch_add(1, Ordering::Relaxed);

        // Snapshot-then-notify: never hold the lock across handler calls.
        let handlers: Vec<Handler> = {
            let subscribers = self.inner.subscribers.lock();
            subscribers
                .iter()
                .filter(|s| s.filter.matches(event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };

        for handler in &handlers {
            if let Err(e) = handler(event) {
                warn!(
                    event_type = event.event_type(),
                    error = %e,
                    "event handler failed, continuing fan-out"
                );
            }
        }

        let _ = self.inner.broadcast.send(event.clone());
        handlers.len()
    }

    /// Async bridge: a receiver seeing every event published after this
    /// call.
    #[must_use]
    pub fn watch_all(&self) -> broadcast::Receiver<PlanEvent> {
        self.inner.broadcast.subscribe()
    }

    /// Number of registered sync subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Total events published.
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.inner.publish_count.load(Ordering::Relaxed)
    }
}

/// Handle for one registered handler. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    inner: Weak<Inner>,
}

impl Subscription {
    /// Remove the handler now, consuming the handle.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.subscribers.lock().retain(|s| s.id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::events::{BaseEvent, TodoOutcome, todo_complete_event, todo_start_event};
    use maestro_core::ids::TodoId;

    fn start_event(plan_id: &PlanId) -> PlanEvent {
        todo_start_event(plan_id.clone(), TodoId::generate(), "build")
    }

    #[test]
    fn publish_with_no_subscribers() {
        let bus = EventBus::new();
        let count = bus.publish(&start_event(&PlanId::generate()));
        assert_eq!(count, 0);
        assert_eq!(bus.publish_count(), 1);
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventFilter::All, move |_| {
                seen.lock().push(1);
                Ok(())
            })
        };
        let s2 = {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventFilter::All, move |_| {
                seen.lock().push(2);
                Ok(())
            })
        };

        let _ = bus.publish(&start_event(&PlanId::generate()));
        assert_eq!(*seen.lock(), vec![1, 2]);
        drop((s1, s2));
    }

    #[test]
    fn handler_error_is_isolated() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s1 = bus.subscribe(EventFilter::All, |_| Err("handler broke".into()));
        let s2 = {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventFilter::All, move |_| {
                seen.lock().push("ok");
                Ok(())
            })
        };

        let count = bus.publish(&start_event(&PlanId::generate()));
        assert_eq!(count, 2);
        assert_eq!(*seen.lock(), vec!["ok"]);
        drop((s1, s2));
    }

    #[test]
    fn drop_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventFilter::All, |_| Ok(()));
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(&start_event(&PlanId::generate())), 0);
    }

    #[test]
    fn unsubscribe_consumes_handle() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventFilter::All, |_| Ok(()));
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn plan_filter_matches_only_its_plan() {
        let bus = EventBus::new();
        let plan_a = PlanId::generate();
        let plan_b = PlanId::generate();
        let hits = Arc::new(AtomicU64::new(0));

        let sub = {
            let hits = Arc::clone(&hits);
            bus.subscribe(EventFilter::Plan(plan_a.clone()), move |_| {
                let _ = hits.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })
        };

        let _ = bus.publish(&start_event(&plan_a));
        let _ = bus.publish(&start_event(&plan_b));
        let _ = bus.publish(&start_event(&plan_a));
        assert_eq!(hits.load(Ordering::Relaxed), 2);
        drop(sub);
    }

    #[tokio::test]
    async fn broadcast_bridge_receives() {
        let bus = EventBus::new();
        let mut rx = bus.watch_all();

        let plan_id = PlanId::generate();
        let _ = bus.publish(&start_event(&plan_id));
        let _ = bus.publish(&todo_complete_event(
            plan_id.clone(),
            TodoId::generate(),
            TodoOutcome::Completed,
            42,
            None,
        ));

        let e1 = rx.recv().await.unwrap();
        assert_eq!(e1.event_type(), "todo_start");
        let e2 = rx.recv().await.unwrap();
        assert_eq!(e2.event_type(), "todo_complete");
    }

    #[tokio::test]
    async fn slow_bridge_receiver_lags() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.watch_all();
        let plan_id = PlanId::generate();
        for _ in 0..3 {
            let _ = bus.publish(&start_event(&plan_id));
        }
        assert!(rx.recv().await.is_err());
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventFilter::All, |_| Ok(()));
        drop(bus);
        drop(sub);
    }

    #[test]
    fn events_serialize_for_wire_observers() {
        let plan_id = PlanId::generate();
        let event = PlanEvent::PlanComplete {
            base: BaseEvent::now(plan_id),
            completed: 3,
            duration_ms: 1200,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"plan_complete\""));
    }
}
