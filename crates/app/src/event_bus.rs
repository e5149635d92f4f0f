//! In-process notification fan-out with synchronous delivery.
//!
//! Unlike a channel, [`Subscribers::publish`] runs every handler inline on the
//! caller's execution context before returning. Handlers may publish again or
//! (un)subscribe while being called; the handler list is snapshotted before
//! delivery so re-entrant calls never deadlock.

use std::sync::{Arc, Mutex, PoisonError};

use trafficsync_domain::id::SubscriptionId;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of handlers for one kind of notification.
pub struct Subscribers<E> {
    handlers: Mutex<Vec<(SubscriptionId, Handler<E>)>>,
}

impl<E> Default for Subscribers<E> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<E> std::fmt::Debug for Subscribers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}

impl<E> Subscribers<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; it sees every notification published afterwards.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered here.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Call every handler, in subscription order, before returning.
    pub fn publish(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn should_deliver_event_to_subscriber_before_returning() {
        let bus = Subscribers::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |value| sink.lock().unwrap().push(*value));

        bus.publish(&7);

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn should_deliver_event_to_multiple_subscribers_in_order() {
        let bus = Subscribers::<&'static str>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        bus.subscribe(move |_| first.lock().unwrap().push("first"));
        bus.subscribe(move |_| second.lock().unwrap().push("second"));

        bus.publish(&"ping");

        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn should_succeed_when_no_subscribers() {
        let bus = Subscribers::<u32>::new();
        bus.publish(&1);
        assert!(bus.is_empty());
    }

    #[test]
    fn should_stop_delivering_after_unsubscribe() {
        let bus = Subscribers::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = bus.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&1);
        assert!(bus.unsubscribe(id));
        bus.publish(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
    }

    #[test]
    fn should_allow_reentrant_subscription_from_handler() {
        let bus = Arc::new(Subscribers::<u32>::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        bus.publish(&1);

        assert_eq!(bus.len(), 2);
    }
}
