//! # Event Publisher
//!
//! The channel-keyed bus: registration, synchronous fan-out and one-shot
//! awaits.

use crate::subscriber::{BusError, Listener, ListenerId, Unsubscribe};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

type Registrations<E> = Vec<(ListenerId, Listener<E>)>;

/// In-memory, channel-keyed event bus.
///
/// Listeners of one channel run synchronously on the firing task, in
/// registration order. The bus is constructed explicitly and shared through
/// an `Arc`; call [`EventBus::dispose`] at shutdown.
pub struct EventBus<E> {
    /// Listeners by channel, in registration order.
    channels: RwLock<HashMap<String, Registrations<E>>>,

    /// Total fires that reached at least one listener.
    events_fired: AtomicU64,

    /// Set once by `dispose`.
    disposed: AtomicBool,
}

impl<E: 'static> EventBus<E> {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            events_fired: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register `callback` under `channel` with a generated id.
    pub fn subscribe<F>(&self, channel: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_with_id(channel, ListenerId::generate(), callback)
    }

    /// Register `callback` under `channel` with an explicit id.
    ///
    /// An existing registration with the same id is replaced in place and
    /// keeps its position in the invocation order.
    pub fn subscribe_with_id<F>(
        &self,
        channel: impl Into<String>,
        id: impl Into<ListenerId>,
        callback: F,
    ) -> ListenerId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let id = id.into();

        if self.is_disposed() {
            warn!(channel = %channel, listener = %id, "Subscribe on disposed bus ignored");
            return id;
        }

        let callback: Listener<E> = Arc::new(callback);
        let mut channels = self.channels.write();
        let listeners = channels.entry(channel.clone()).or_default();

        match listeners.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = callback,
            None => listeners.push((id.clone(), callback)),
        }

        debug!(channel = %channel, listener = %id, "Listener registered");
        id
    }

    /// Remove listeners. Returns how many were removed.
    pub fn unsubscribe(&self, scope: Unsubscribe) -> usize {
        let mut channels = self.channels.write();
        match scope {
            Unsubscribe::All => {
                let removed = channels.values().map(Vec::len).sum();
                channels.clear();
                removed
            }
            Unsubscribe::Channel(channel) => {
                channels.remove(&channel).map_or(0, |listeners| listeners.len())
            }
            Unsubscribe::One(channel, id) => {
                let Some(listeners) = channels.get_mut(&channel) else {
                    return 0;
                };
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                before - listeners.len()
            }
        }
    }

    pub fn unsubscribe_all(&self) -> usize {
        self.unsubscribe(Unsubscribe::All)
    }

    pub fn unsubscribe_channel(&self, channel: &str) -> usize {
        self.unsubscribe(Unsubscribe::channel(channel))
    }

    pub fn unsubscribe_one(&self, channel: &str, id: &ListenerId) -> usize {
        self.unsubscribe(Unsubscribe::one(channel, id.clone()))
    }

    /// Invoke every listener currently registered on `channel`.
    ///
    /// Works on a snapshot taken before the first callback runs, so callbacks
    /// may subscribe, unsubscribe or fire reentrantly. A panicking callback is
    /// logged and skipped. Returns the number of callbacks that completed.
    pub fn fire(&self, channel: &str, event: &E) -> usize {
        if self.is_disposed() {
            trace!(channel = %channel, "Fire on disposed bus ignored");
            return 0;
        }

        let snapshot: Registrations<E> = self
            .channels
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default();

        if snapshot.is_empty() {
            trace!(channel = %channel, "Fire without listeners");
            return 0;
        }

        self.events_fired.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for (id, callback) in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(channel = %channel, listener = %id, "Listener panicked"),
            }
        }

        trace!(channel = %channel, delivered, "Event fired");
        delivered
    }

    /// Wait for the next fire on `channel` and return its payload.
    ///
    /// The one-shot listener is removed once the await completes or is
    /// dropped. Fails with [`BusError::Closed`] if the listener is removed
    /// before the channel fires.
    pub async fn until(&self, channel: &str) -> Result<E, BusError>
    where
        E: Clone + Send,
    {
        let (tx, rx) = oneshot::channel::<E>();
        let slot = Mutex::new(Some(tx));

        let id = self.subscribe(channel, move |event: &E| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(event.clone());
            }
        });

        let _guard = UntilGuard {
            bus: self,
            channel,
            id,
        };

        rx.await.map_err(|_| BusError::Closed)
    }

    /// Number of listeners on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.read().get(channel).map_or(0, Vec::len)
    }

    /// Number of channels with a registration entry.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Total fires that reached at least one listener.
    #[must_use]
    pub fn events_fired(&self) -> u64 {
        self.events_fired.load(Ordering::Relaxed)
    }

    /// Remove every listener and refuse further registrations and fires.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let removed = self.unsubscribe_all();
        debug!(removed, "Event bus disposed");
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<E: 'static> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels.read().len())
            .field("events_fired", &self.events_fired.load(Ordering::Relaxed))
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Removes the one-shot listener registered by `until`.
struct UntilGuard<'a, E: 'static> {
    bus: &'a EventBus<E>,
    channel: &'a str,
    id: ListenerId,
}

impl<E: 'static> Drop for UntilGuard<'_, E> {
    fn drop(&mut self) {
        self.bus.unsubscribe_one(self.channel, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::time::timeout;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Listener<u32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_for_make = log.clone();
        let make = move |name: &'static str| -> Listener<u32> {
            let log = log_for_make.clone();
            Arc::new(move |value: &u32| log.lock().push(format!("{name}:{value}")))
        };
        (log, make)
    }

    #[test]
    fn test_fire_in_registration_order() {
        let bus = EventBus::<u32>::new();
        let (log, make) = recorder();

        let first = make("first");
        let second = make("second");
        bus.subscribe("c", move |v| first(v));
        bus.subscribe("c", move |v| second(v));

        assert_eq!(bus.fire("c", &7), 2);
        assert_eq!(*log.lock(), vec!["first:7", "second:7"]);
    }

    #[test]
    fn test_fire_unregistered_channel() {
        let bus = EventBus::<u32>::new();
        assert_eq!(bus.fire("nobody", &1), 0);
        assert_eq!(bus.events_fired(), 0);
    }

    #[test]
    fn test_explicit_id_overwrites_in_place() {
        let bus = EventBus::<u32>::new();
        let (log, make) = recorder();

        let a = make("a");
        let b = make("b");
        let c = make("c");
        bus.subscribe_with_id("c", "x", move |v| a(v));
        bus.subscribe_with_id("c", "y", move |v| b(v));
        bus.subscribe_with_id("c", "x", move |v| c(v));

        assert_eq!(bus.listener_count("c"), 2);
        bus.fire("c", &1);
        assert_eq!(*log.lock(), vec!["c:1", "b:1"]);
    }

    #[test]
    fn test_unsubscribe_one() {
        let bus = EventBus::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let removed = bus.subscribe("c", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        let h = hits.clone();
        bus.subscribe("c", move |_| {
            h.fetch_add(10, Ordering::SeqCst);
        });

        assert_eq!(bus.unsubscribe_one("c", &removed), 1);
        bus.fire("c", &0);
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_unsubscribe_channel_and_all() {
        let bus = EventBus::<u32>::new();
        bus.subscribe("a", |_| {});
        bus.subscribe("a", |_| {});
        bus.subscribe("b", |_| {});

        assert_eq!(bus.unsubscribe_channel("a"), 2);
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.channel_count(), 1);

        assert_eq!(bus.unsubscribe_all(), 1);
        assert_eq!(bus.channel_count(), 0);
        assert_eq!(bus.fire("b", &0), 0);
    }

    #[test]
    fn test_unsubscribe_absent_is_noop() {
        let bus = EventBus::<u32>::new();
        assert_eq!(bus.unsubscribe_channel("missing"), 0);
        assert_eq!(bus.unsubscribe_one("missing", &ListenerId::from("x")), 0);
        bus.subscribe("c", |_| {});
        assert_eq!(bus.unsubscribe_one("c", &ListenerId::from("x")), 0);
        assert_eq!(bus.listener_count("c"), 1);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::<u32>::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe("c", |_| panic!("listener failure"));
        let h = hits.clone();
        bus.subscribe("c", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.fire("c", &0), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reentrant_mutation_uses_snapshot() {
        let bus = Arc::new(EventBus::<u32>::new());
        let hits = Arc::new(AtomicUsize::new(0));

        let inner_bus = bus.clone();
        let h = hits.clone();
        bus.subscribe("c", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
            let h = h.clone();
            // Registered during the fire: must not run in this fire.
            inner_bus.subscribe("c", move |_| {
                h.fetch_add(100, Ordering::SeqCst);
            });
        });

        assert_eq!(bus.fire("c", &0), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("c"), 2);
    }

    #[tokio::test]
    async fn test_until_resolves_with_first_fire() {
        let bus = Arc::new(EventBus::<u32>::new());

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.until("ready").await })
        };

        // Let the waiter register.
        while bus.listener_count("ready") == 0 {
            tokio::task::yield_now().await;
        }

        bus.fire("ready", &42);
        bus.fire("ready", &43);

        let value = timeout(Duration::from_millis(100), waiter)
            .await
            .expect("timeout")
            .expect("join");
        assert_eq!(value, Ok(42));
        assert_eq!(bus.listener_count("ready"), 0);
    }

    #[tokio::test]
    async fn test_until_closed_on_unsubscribe() {
        let bus = Arc::new(EventBus::<u32>::new());

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.until("ready").await })
        };

        while bus.listener_count("ready") == 0 {
            tokio::task::yield_now().await;
        }
        bus.unsubscribe_channel("ready");

        let result = timeout(Duration::from_millis(100), waiter)
            .await
            .expect("timeout")
            .expect("join");
        assert_eq!(result, Err(BusError::Closed));
    }

    #[tokio::test]
    async fn test_dropped_until_removes_listener() {
        let bus = EventBus::<u32>::new();
        let _ = timeout(Duration::from_millis(5), bus.until("never")).await;
        assert_eq!(bus.listener_count("never"), 0);
    }

    #[test]
    fn test_dispose() {
        let bus = EventBus::<u32>::new();
        bus.subscribe("c", |_| {});
        bus.dispose();

        assert!(bus.is_disposed());
        assert_eq!(bus.channel_count(), 0);

        bus.subscribe("c", |_| {});
        assert_eq!(bus.listener_count("c"), 0);
        assert_eq!(bus.fire("c", &0), 0);
    }

    #[test]
    fn test_events_fired_counter() {
        let bus = EventBus::<u32>::default();
        bus.subscribe("c", |_| {});
        bus.fire("c", &1);
        bus.fire("c", &2);
        bus.fire("other", &3);
        assert_eq!(bus.events_fired(), 2);
    }
}
