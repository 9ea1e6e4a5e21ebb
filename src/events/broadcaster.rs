//! Publish/subscribe broadcaster.

use super::watcher::Watcher;
use crate::error::Result;
use crate::substrate::Substrate;
use crate::types::{ChangeEvent, Fingerprint, StorageKey};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Registration-ordered subscriber lists per event name.
///
/// Shared between the broadcaster and its watcher thread.
pub(crate) struct SubscriberRegistry {
    channels: RwLock<HashMap<String, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn add(&self, event: &str, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.channels
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Subscriber { id, callback });
        id
    }

    fn remove(&self, event: &str, id: SubscriptionId) {
        let mut channels = self.channels.write();
        if let Some(subscribers) = channels.get_mut(event) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                channels.remove(event);
            }
        }
    }

    /// Invoke every subscriber for `event` in registration order.
    ///
    /// Callbacks are cloned out before invocation so they run without the
    /// registry lock held; a callback may itself subscribe or unsubscribe.
    pub(crate) fn dispatch(&self, event: &str, payload: &Value) {
        let callbacks: Vec<Callback> = {
            let channels = self.channels.read();
            match channels.get(event) {
                Some(subscribers) => subscribers.iter().map(|s| s.callback.clone()).collect(),
                None => return,
            }
        };

        for callback in callbacks {
            callback(payload);
        }
    }

    /// Event names that currently have at least one subscriber.
    pub(crate) fn watched_events(&self) -> Vec<String> {
        self.channels.read().keys().cloned().collect()
    }

    pub(crate) fn subscriber_count(&self, event: &str) -> usize {
        self.channels.read().get(event).map_or(0, Vec::len)
    }
}

/// Handle to an active subscription.
///
/// A subscription stays active until [`unsubscribe`](Self::unsubscribe) is
/// called; dropping the handle does not detach it. Unsubscribing twice is a
/// no-op after the first call, and a detached subscription can never be
/// re-activated (subscribe again for a fresh one).
pub struct SubscriptionHandle {
    id: SubscriptionId,
    event: String,
    registry: Arc<SubscriberRegistry>,
    detached: AtomicBool,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Event name this subscription listens to.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Detach the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        self.registry.remove(&self.event, self.id);
    }

    pub fn is_active(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }
}

/// Fans out named events to same-process subscribers and, through the
/// substrate, to other processes sharing it.
pub struct Broadcaster {
    namespace: String,
    substrate: Arc<dyn Substrate>,
    registry: Arc<SubscriberRegistry>,

    /// Fingerprint of this process's most recent publish per event name.
    /// The watcher skips these so a process never hears its own writes.
    own_writes: Arc<Mutex<HashMap<String, Fingerprint>>>,

    /// Polls for other processes' events; absent when watching is disabled.
    _watcher: Option<Watcher>,
}

impl Broadcaster {
    /// Create a broadcaster. When `poll_interval` is set, a watcher thread
    /// polls the substrate at that cadence for events published elsewhere.
    pub fn new(
        namespace: impl Into<String>,
        substrate: Arc<dyn Substrate>,
        poll_interval: Option<Duration>,
    ) -> Result<Self> {
        let namespace = namespace.into();
        let registry = Arc::new(SubscriberRegistry::new());
        let own_writes = Arc::new(Mutex::new(HashMap::new()));

        let watcher = match poll_interval {
            Some(interval) => Some(Watcher::spawn(
                namespace.clone(),
                substrate.clone(),
                registry.clone(),
                own_writes.clone(),
                interval,
            )?),
            None => None,
        };

        Ok(Self {
            namespace,
            substrate,
            registry,
            own_writes,
            _watcher: watcher,
        })
    }

    /// Publish `payload` under `event`.
    ///
    /// The event is persisted to the shared slot, then every same-process
    /// subscriber is invoked synchronously in registration order before this
    /// returns. Local delivery happens even when persistence fails; the
    /// persistence error is still returned so callers can tell.
    pub fn publish(&self, event: &str, payload: Value) -> Result<()> {
        let envelope = ChangeEvent::new(event, payload);
        let raw = serde_json::to_string(&envelope)?;

        // Record the fingerprint before the slot becomes visible; a watcher
        // poll landing mid-write must not relay this publish back to us.
        self.own_writes
            .lock()
            .insert(event.to_string(), Fingerprint::of(&raw));

        let persisted = self
            .substrate
            .set(&StorageKey::event(&self.namespace, event), &raw);
        if let Err(ref err) = persisted {
            warn!(event, error = %err, "failed to persist event, delivering locally only");
        }

        self.registry.dispatch(event, &envelope.data);
        persisted
    }

    /// Register `callback` for every future publish of `event`.
    ///
    /// The callback also fires when another process sharing the substrate
    /// publishes the event. Events published before subscribing are never
    /// replayed.
    pub fn subscribe<F>(&self, event: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.registry.add(event, Arc::new(callback));
        SubscriptionHandle {
            id,
            event: event.to_string(),
            registry: self.registry.clone(),
            detached: AtomicBool::new(false),
        }
    }

    /// Number of active subscriptions for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.registry.subscriber_count(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::{MemorySubstrate, MutationGuard};
    use serde_json::json;
    use std::thread;

    fn test_broadcaster() -> Broadcaster {
        let substrate = Arc::new(MemorySubstrate::new());
        Broadcaster::new("app", substrate, None).unwrap()
    }

    /// Substrate whose `set` makes the value visible, then lingers before
    /// returning, widening the window in which a watcher poll can observe a
    /// publish still in flight.
    struct LingeringSubstrate {
        inner: MemorySubstrate,
        linger: Duration,
    }

    impl Substrate for LingeringSubstrate {
        fn get(&self, key: &crate::types::StorageKey) -> crate::error::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &crate::types::StorageKey, value: &str) -> crate::error::Result<()> {
            self.inner.set(key, value)?;
            thread::sleep(self.linger);
            Ok(())
        }

        fn remove(&self, key: &crate::types::StorageKey) -> crate::error::Result<()> {
            self.inner.remove(key)
        }

        fn lock_exclusive(&self) -> crate::error::Result<MutationGuard<'_>> {
            self.inner.lock_exclusive()
        }
    }

    #[test]
    fn test_publish_delivers_synchronously() {
        let broadcaster = test_broadcaster();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();
        let _handle = broadcaster.subscribe("x", move |payload| {
            sink.lock().push(payload.clone());
        });

        broadcaster.publish("x", json!({"id": "p1"})).unwrap();

        // Synchronous: visible as soon as publish returns.
        let seen = received.lock();
        assert_eq!(seen.as_slice(), &[json!({"id": "p1"})]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let broadcaster = test_broadcaster();
        let count = Arc::new(AtomicU64::new(0));

        let sink = count.clone();
        let handle = broadcaster.subscribe("x", move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.publish("x", json!(1)).unwrap();
        handle.unsubscribe();
        broadcaster.publish("x", json!(2)).unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!handle.is_active());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let broadcaster = test_broadcaster();
        let handle = broadcaster.subscribe("x", |_| {});

        handle.unsubscribe();
        handle.unsubscribe();
        assert_eq!(broadcaster.subscriber_count("x"), 0);
    }

    #[test]
    fn test_multiple_subscribers_fire_in_registration_order() {
        let broadcaster = test_broadcaster();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = order.clone();
        let _a = broadcaster.subscribe("x", move |_| first.lock().push("first"));
        let second = order.clone();
        let _b = broadcaster.subscribe("x", move |_| second.lock().push("second"));

        broadcaster.publish("x", json!(null)).unwrap();
        broadcaster.publish("x", json!(null)).unwrap();

        assert_eq!(
            order.lock().as_slice(),
            &["first", "second", "first", "second"]
        );
    }

    #[test]
    fn test_events_are_isolated_by_name() {
        let broadcaster = test_broadcaster();
        let count = Arc::new(AtomicU64::new(0));

        let sink = count.clone();
        let _handle = broadcaster.subscribe("wanted", move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.publish("other", json!(null)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribing_from_a_callback_does_not_deadlock() {
        let substrate = Arc::new(MemorySubstrate::new());
        let broadcaster = Arc::new(Broadcaster::new("app", substrate, None).unwrap());

        let inner = broadcaster.clone();
        let _handle = broadcaster.subscribe("x", move |_| {
            let late = inner.subscribe("x", |_| {});
            late.unsubscribe();
        });

        broadcaster.publish("x", json!(null)).unwrap();
        assert_eq!(broadcaster.subscriber_count("x"), 1);
    }

    #[test]
    fn test_watcher_ignores_publish_still_in_flight() {
        let substrate = Arc::new(LingeringSubstrate {
            inner: MemorySubstrate::new(),
            linger: Duration::from_millis(100),
        });
        let broadcaster =
            Broadcaster::new("app", substrate, Some(Duration::from_millis(5))).unwrap();

        let count = Arc::new(AtomicU64::new(0));
        let sink = count.clone();
        let _handle = broadcaster.subscribe("ping", move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        // Let the watcher observe the slot absent before publishing.
        thread::sleep(Duration::from_millis(50));

        broadcaster.publish("ping", json!({"n": 1})).unwrap();

        // Several polls land while `set` is still in flight and after; none
        // may relay the publish back on top of the synchronous delivery.
        thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_persists_wire_format() {
        let substrate = Arc::new(MemorySubstrate::new());
        let broadcaster =
            Broadcaster::new("app", substrate.clone() as Arc<dyn Substrate>, None).unwrap();

        broadcaster.publish("ping", json!({"n": 1})).unwrap();

        let raw = substrate
            .get(&StorageKey::event("app", "ping"))
            .unwrap()
            .unwrap();
        let envelope: ChangeEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(envelope.event_type, "ping");
        assert_eq!(envelope.data, json!({"n": 1}));
    }
}
