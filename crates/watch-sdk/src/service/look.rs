//! Look relay: subscriptions to values watched by other devices.
//!
//! `look` listens on the index's push channel and, while online, announces
//! interest upstream on `@look:update`. Looked indices are remembered and
//! announced on every `@look:resume`, so interest registered while offline
//! (or lost by the relay on reconnect) is restored once the connection comes
//! back.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};
use watch_bus::{EventBus, ListenerId};

use crate::domain::channels::{look_channel, LOOK_PAUSE, LOOK_RESUME, LOOK_UPDATE};
use crate::domain::WatchEvent;

/// Listener id used for the relay's own registrations.
pub const LOOK_LISTENER: &str = "look-relay";

struct Inner {
    bus: Arc<EventBus<WatchEvent>>,
    indices: Mutex<BTreeSet<String>>,
    online: AtomicBool,
}

#[derive(Clone)]
pub struct LookRelay {
    inner: Arc<Inner>,
}

impl LookRelay {
    pub fn new(bus: Arc<EventBus<WatchEvent>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                indices: Mutex::new(BTreeSet::new()),
                online: AtomicBool::new(false),
            }),
        }
    }

    /// Bind to `@look:resume` and `@look:pause`.
    pub fn install(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .bus
            .subscribe_with_id(LOOK_RESUME, LOOK_LISTENER, move |_: &WatchEvent| {
                if let Some(inner) = weak.upgrade() {
                    LookRelay { inner }.resume();
                }
            });

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner
            .bus
            .subscribe_with_id(LOOK_PAUSE, LOOK_LISTENER, move |_: &WatchEvent| {
                if let Some(inner) = weak.upgrade() {
                    LookRelay { inner }.pause();
                }
            });
    }

    /// Invoke `callback` with every value pushed for `index`. Interest is
    /// announced now if online, otherwise on the next resume.
    pub fn look<F>(&self, index: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.indices.lock().insert(index.to_string());
        if self.is_online() {
            self.announce(index);
        } else {
            debug!(index = %index, "Offline, announcement deferred");
        }

        let id = self
            .inner
            .bus
            .subscribe(look_channel(index), move |event: &WatchEvent| {
                if let WatchEvent::Push { data, .. } = event {
                    callback(data);
                }
            });
        debug!(index = %index, listener = %id, "Look registered");
        id
    }

    /// Remove one look callback. The index stops being re-announced once its
    /// last callback is gone.
    pub fn unlook(&self, index: &str, id: &ListenerId) -> bool {
        let channel = look_channel(index);
        let removed = self.inner.bus.unsubscribe_one(&channel, id) > 0;
        if removed && self.inner.bus.listener_count(&channel) == 0 {
            self.inner.indices.lock().remove(index);
        }
        removed
    }

    fn announce(&self, index: &str) {
        self.inner.bus.fire(
            LOOK_UPDATE,
            &WatchEvent::Announce {
                index: index.to_string(),
            },
        );
    }

    fn resume(&self) {
        self.inner.online.store(true, Ordering::SeqCst);
        let indices: Vec<String> = self.inner.indices.lock().iter().cloned().collect();
        info!(count = indices.len(), "Look relay resumed");
        for index in &indices {
            self.announce(index);
        }
    }

    fn pause(&self) {
        self.inner.online.store(false, Ordering::SeqCst);
        info!("Look relay paused");
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Indices currently looked at.
    #[must_use]
    pub fn indices(&self) -> Vec<String> {
        self.inner.indices.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn announcements(bus: &EventBus<WatchEvent>) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        bus.subscribe(LOOK_UPDATE, move |event: &WatchEvent| {
            if let WatchEvent::Announce { index } = event {
                log.lock().push(index.clone());
            }
        });
        seen
    }

    #[test]
    fn test_look_announces_and_receives() {
        let bus = Arc::new(EventBus::new());
        let relay = LookRelay::new(bus.clone());
        relay.install();
        bus.fire(LOOK_RESUME, &WatchEvent::Signal);
        let seen = announcements(&bus);

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        relay.look("price", move |value| sink.lock().push(value.clone()));

        assert_eq!(*seen.lock(), vec!["price"]);

        bus.fire(
            &look_channel("price"),
            &WatchEvent::Push {
                index: "price".to_string(),
                data: json!(9.5),
            },
        );
        bus.fire(
            &look_channel("other"),
            &WatchEvent::Push {
                index: "other".to_string(),
                data: json!(1),
            },
        );

        assert_eq!(*received.lock(), vec![json!(9.5)]);
    }

    #[test]
    fn test_resume_reannounces() {
        let bus = Arc::new(EventBus::new());
        let relay = LookRelay::new(bus.clone());
        relay.install();
        relay.look("a", |_| {});
        relay.look("b", |_| {});
        relay.look("a", |_| {});

        let seen = announcements(&bus);
        bus.fire(LOOK_RESUME, &WatchEvent::Signal);

        assert!(relay.is_online());
        assert_eq!(*seen.lock(), vec!["a", "b"]);

        bus.fire(LOOK_PAUSE, &WatchEvent::Signal);
        assert!(!relay.is_online());
    }

    #[test]
    fn test_offline_look_waits_for_resume() {
        let bus = Arc::new(EventBus::new());
        let relay = LookRelay::new(bus.clone());
        relay.install();
        let seen = announcements(&bus);

        relay.look("price", |_| {});
        assert!(seen.lock().is_empty());
        assert_eq!(relay.indices(), vec!["price"]);

        bus.fire(LOOK_RESUME, &WatchEvent::Signal);
        assert_eq!(*seen.lock(), vec!["price"]);

        bus.fire(LOOK_PAUSE, &WatchEvent::Signal);
        relay.look("volume", |_| {});
        assert_eq!(*seen.lock(), vec!["price"]);
    }

    #[test]
    fn test_unlook_last_callback_forgets_index() {
        let bus = Arc::new(EventBus::new());
        let relay = LookRelay::new(bus.clone());
        let first = relay.look("price", |_| {});
        let second = relay.look("price", |_| {});

        assert!(relay.unlook("price", &first));
        assert_eq!(relay.indices(), vec!["price"]);
        assert!(relay.unlook("price", &second));
        assert!(relay.indices().is_empty());
        assert!(!relay.unlook("price", &second));
    }
}
