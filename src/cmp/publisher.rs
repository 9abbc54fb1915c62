//! Single-value broadcast of the current TC string.
//!
//! [`TcStringPublisher`] remembers the last published string and calls every
//! subscriber synchronously, in subscription order, each time a new one is
//! published. Callbacks run after the registry lock is released, so a callback
//! may subscribe, unsubscribe or read [`TcStringPublisher::current_value`].
//! Subscribers added while a publish is running are first called on the next one.
//!
//! Every publish carries a revision. A publish whose revision is not newer
//! than the current one is dropped, and a publish that gets superseded while
//! its callbacks run stops notifying, so the current value is always the
//! newest string.
//!
//! Async consumers can use [`TcStringPublisher::watch`] instead of a callback.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use uuid::Uuid;

pub type TcStringCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Opaque token identifying one subscription.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Default)]
struct Registry {
    current: String,
    revision: u64,
    subscribers: Vec<(SubscriptionId, TcStringCallback)>,
}

struct Shared {
    registry: Mutex<Registry>,
    watch: watch::Sender<String>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        let before = registry.subscribers.len();
        registry.subscribers.retain(|(sid, _)| *sid != id);
        registry.subscribers.len() != before
    }
}

#[derive(Clone)]
pub struct TcStringPublisher {
    shared: Arc<Shared>,
}

impl fmt::Debug for TcStringPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.shared.registry();
        f.debug_struct("TcStringPublisher")
            .field("current", &registry.current)
            .field("subscribers", &registry.subscribers.len())
            .finish()
    }
}

impl Default for TcStringPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TcStringPublisher {
    pub fn new() -> Self {
        let (watch, _rx) = watch::channel(String::new());
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                watch,
            }),
        }
    }

    /// Latest published string, or `""` if nothing was published yet.
    pub fn current_value(&self) -> String {
        self.shared.registry().current.clone()
    }

    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.shared.registry().subscribers.push((id, Arc::new(callback)));
        Unsubscribe {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Receiver that always holds the latest published string.
    pub fn watch(&self) -> watch::Receiver<String> {
        self.shared.watch.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.registry().subscribers.len()
    }

    /// Revision of the current value. Starts at 0 before anything is published.
    pub fn revision(&self) -> u64 {
        self.shared.registry().revision
    }

    /// Stores `value` and notifies every current subscriber, even if the value did not change.
    pub fn publish(&self, value: &str) {
        let (revision, callbacks) = {
            let mut registry = self.shared.registry();
            let revision = registry.revision + 1;
            (revision, self.store(&mut registry, revision, value))
        };
        self.notify(revision, value, callbacks);
    }

    /// Publishes `value` as `revision`.
    ///
    /// Returns `false` without notifying anyone when a newer or equal revision
    /// was already published.
    pub fn publish_at(&self, revision: u64, value: &str) -> bool {
        let callbacks = {
            let mut registry = self.shared.registry();
            if revision <= registry.revision {
                log::debug!("dropping stale publish r{revision}, current is r{}", registry.revision);
                return false;
            }
            self.store(&mut registry, revision, value)
        };
        self.notify(revision, value, callbacks);
        true
    }

    fn store(&self, registry: &mut Registry, revision: u64, value: &str) -> Vec<TcStringCallback> {
        registry.revision = revision;
        registry.current = value.to_string();
        self.shared.watch.send_replace(value.to_string());
        registry.subscribers.iter().map(|(_, cb)| cb.clone()).collect()
    }

    /// Calls `callbacks` until a newer revision replaces `revision`.
    fn notify(&self, revision: u64, value: &str, callbacks: Vec<TcStringCallback>) {
        log::trace!("publishing tc string r{revision} to {} subscribers", callbacks.len());
        for callback in callbacks {
            if self.shared.registry().revision != revision {
                log::debug!("publish r{revision} superseded, skipping remaining subscribers");
                break;
            }
            callback(value);
        }
    }
}

/// Handle returned by [`TcStringPublisher::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call [`Unsubscribe::unsubscribe`]
/// to end it.
#[derive(Debug, Clone)]
pub struct Unsubscribe {
    id: SubscriptionId,
    shared: Weak<Shared>,
}

impl Unsubscribe {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes the subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.remove(self.id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: &str| sink.lock().unwrap().push(v.to_string()))
    }

    #[test]
    fn current_value_starts_empty() {
        let publisher = TcStringPublisher::new();
        assert_eq!(publisher.current_value(), "");
    }

    #[test]
    fn subscribers_are_called_in_order() {
        let publisher = TcStringPublisher::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            publisher.subscribe(move |_| order.lock().unwrap().push(n));
        }
        publisher.publish("CQ");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(publisher.current_value(), "CQ");
    }

    #[test]
    fn empty_and_repeated_values_still_notify() {
        let publisher = TcStringPublisher::new();
        let (seen, cb) = recorder();
        publisher.subscribe(cb);
        publisher.publish("");
        publisher.publish("");
        assert_eq!(*seen.lock().unwrap(), vec!["".to_string(), "".to_string()]);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let publisher = TcStringPublisher::new();
        let (seen, cb) = recorder();
        let handle = publisher.subscribe(cb);
        publisher.publish("a");
        assert!(handle.unsubscribe());
        assert!(!handle.unsubscribe());
        publisher.publish("b");
        assert_eq!(*seen.lock().unwrap(), vec!["a".to_string()]);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_added_during_publish_waits_for_next_one() {
        let publisher = TcStringPublisher::new();
        let (seen, cb) = recorder();
        let cb = Arc::new(cb);
        let inner = publisher.clone();
        let added = Arc::new(Mutex::new(false));
        let flag = added.clone();
        publisher.subscribe(move |_| {
            let mut added = flag.lock().unwrap();
            if !*added {
                *added = true;
                let cb = cb.clone();
                inner.subscribe(move |v| cb(v));
            }
        });

        publisher.publish("first");
        assert!(seen.lock().unwrap().is_empty());
        publisher.publish("second");
        assert_eq!(*seen.lock().unwrap(), vec!["second".to_string()]);
    }

    #[test]
    fn callbacks_can_read_current_value() {
        let publisher = TcStringPublisher::new();
        let inner = publisher.clone();
        let (seen, cb) = recorder();
        publisher.subscribe(move |_| cb(&inner.current_value()));
        publisher.publish("latest");
        assert_eq!(*seen.lock().unwrap(), vec!["latest".to_string()]);
    }

    #[test]
    fn stale_revisions_are_dropped() {
        let publisher = TcStringPublisher::new();
        let (seen, cb) = recorder();
        publisher.subscribe(cb);

        assert!(publisher.publish_at(3, "newer"));
        assert!(!publisher.publish_at(2, "older"));
        assert!(!publisher.publish_at(3, "again"));
        assert_eq!(publisher.current_value(), "newer");
        assert_eq!(publisher.revision(), 3);

        publisher.publish("next");
        assert_eq!(publisher.revision(), 4);
        assert_eq!(*seen.lock().unwrap(), vec!["newer".to_string(), "next".to_string()]);
    }

    #[test]
    fn superseded_publish_stops_notifying() {
        let publisher = TcStringPublisher::new();
        let inner = publisher.clone();
        publisher.subscribe(move |v| {
            if v == "outer" {
                inner.publish_at(2, "inner");
            }
        });
        let (seen, cb) = recorder();
        publisher.subscribe(cb);

        assert!(publisher.publish_at(1, "outer"));
        assert_eq!(publisher.current_value(), "inner");
        assert_eq!(*seen.lock().unwrap(), vec!["inner".to_string()]);
    }

    #[tokio::test]
    async fn watch_receivers_see_latest_value() {
        let publisher = TcStringPublisher::new();
        let mut rx = publisher.watch();
        publisher.publish("CQ.x");
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), "CQ.x");
    }
}
