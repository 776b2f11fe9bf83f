//! # Integration Test Flows
//!
//! Devices sharing one relay, exercised through the public client API only.
//!
//! ## Flows Tested:
//!
//! 1. **watch → relay → look**: a value watched on one device reaches every
//!    device looking at its index
//! 2. **Sync package shape**: what a device actually emits upstream
//! 3. **Acknowledgement**: the relay's status is recorded on the entry

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::sync::{broadcast, mpsc};
    use tokio::time::timeout;

    use watch_sdk::{
        MemoryRelay, MemoryStore, SchedulerPhase, Transport, TransportConnector, TransportError,
        TransportEvent, WatchClient,
    };

    use crate::integration::fixtures::{client, config, eventually, DEADLINE, WATCH_TIME};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    type Emitted = Arc<Mutex<Vec<(String, Value)>>>;

    /// Transport that records every emit and acknowledges with `"stored"`.
    struct RecordingTransport {
        emitted: Emitted,
        events: broadcast::Sender<TransportEvent>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn emit(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
            self.emitted.lock().push((event.to_string(), payload));
            Ok(json!("stored"))
        }

        fn events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct RecordingConnector {
        emitted: Emitted,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TransportConnector for RecordingConnector {
        async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError> {
            self.urls.lock().push(url.to_string());
            let (events, _) = broadcast::channel(16);
            Ok(Arc::new(RecordingTransport {
                emitted: self.emitted.clone(),
                events,
            }))
        }
    }

    /// Re-watch `value` every half interval until the look channel yields.
    ///
    /// A single watch can legitimately miss its freshness window when it
    /// lands while a drain is in flight, so flows keep feeding like a sensor.
    async fn watch_until<T>(
        device: &WatchClient,
        index: &str,
        value: Value,
        rx: &mut mpsc::UnboundedReceiver<T>,
    ) -> T {
        timeout(DEADLINE, async {
            loop {
                device.watch(index, value.clone());
                tokio::select! {
                    received = rx.recv() => return received.expect("look channel closed"),
                    _ = tokio::time::sleep(WATCH_TIME / 2) => {}
                }
            }
        })
        .await
        .expect("value not received before deadline")
    }

    fn emitted_for(emitted: &Emitted, event: &str) -> Vec<Value> {
        emitted
            .lock()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    // =============================================================================
    // INTEGRATION TESTS: WATCH → RELAY → LOOK
    // =============================================================================

    /// A look registered before connecting still receives values.
    #[tokio::test]
    async fn test_look_before_connect_receives_watched_value() {
        let relay = MemoryRelay::new();
        let sensor = client(&relay);
        let dashboard = client(&relay);

        let (tx, mut rx) = mpsc::unbounded_channel();
        dashboard.look("price", move |value| {
            let _ = tx.send(value.clone());
        });

        sensor.connect().await.unwrap();
        dashboard.connect().await.unwrap();
        eventually(|| relay.interested("price") == 1).await;

        let received = watch_until(&sensor, "price", json!(9.5), &mut rx).await;
        assert_eq!(received, json!(9.5));
    }

    /// Every looking device gets the value; others get nothing.
    #[tokio::test]
    async fn test_value_fans_out_to_all_lookers() {
        let relay = MemoryRelay::new();
        let sensor = client(&relay);
        let first = client(&relay);
        let second = client(&relay);
        let bystander = client(&relay);

        let (tx, mut rx) = mpsc::unbounded_channel();
        for (name, device) in [("first", &first), ("second", &second)] {
            let tx = tx.clone();
            device.look("temp", move |value| {
                let _ = tx.send((name, value.clone()));
            });
        }
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        bystander.look("humidity", move |value| {
            let _ = other_tx.send(value.clone());
        });

        for device in [&sensor, &first, &second, &bystander] {
            device.connect().await.unwrap();
        }
        eventually(|| relay.interested("temp") == 2).await;

        let mut names = BTreeSet::new();
        while names.len() < 2 {
            let (name, value) = watch_until(&sensor, "temp", json!({"celsius": 21}), &mut rx).await;
            assert_eq!(value, json!({"celsius": 21}));
            names.insert(name);
        }
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["first", "second"]);
        assert!(other_rx.try_recv().is_err());
    }

    /// Watching the same index repeatedly keeps one buffered entry with the
    /// latest value.
    #[tokio::test]
    async fn test_latest_value_wins() {
        let relay = MemoryRelay::new();
        let sensor = client(&relay);
        sensor.connect().await.unwrap();

        for reading in 0..5 {
            sensor.watch("counter", reading);
        }

        let entry = sensor.scheduler().entry("counter").unwrap();
        assert_eq!(entry.data, json!(4));
    }

    // =============================================================================
    // INTEGRATION TESTS: SYNC PACKAGE
    // =============================================================================

    #[tokio::test]
    async fn test_sync_package_shape_and_ack() {
        let store = MemoryStore::new();
        let connector = Arc::new(RecordingConnector::default());
        let device = WatchClient::init(config(), &store, connector.clone()).unwrap();
        device.connect().await.unwrap();
        assert_eq!(device.scheduler().phase(), SchedulerPhase::Active);

        let emitted = connector.emitted.clone();
        eventually(|| {
            device.watch("temp", 72);
            emitted_for(&emitted, "watch")
                .iter()
                .any(|p| p["index"] == "temp")
        })
        .await;

        let package = emitted_for(&emitted, "watch")
            .into_iter()
            .find(|p| p["index"] == "temp")
            .unwrap();
        assert_eq!(package["appId"], "it-app");
        assert_eq!(package["deviceId"], json!(device.identity().device_id));
        assert_eq!(package["data"], 72);

        let scheduler = device.scheduler().clone();
        eventually(move || {
            scheduler
                .entry("temp")
                .is_some_and(|entry| entry.status == Some(json!("stored")))
        })
        .await;

        assert_eq!(*connector.urls.lock(), vec![device.config().relay_url.clone()]);
    }

    /// The resume heartbeat travels upstream like any other index.
    #[tokio::test]
    async fn test_heartbeat_is_synced_on_connect() {
        let store = MemoryStore::new();
        let connector = Arc::new(RecordingConnector::default());
        let device = WatchClient::init(config(), &store, connector.clone()).unwrap();
        device.connect().await.unwrap();

        let emitted = connector.emitted.clone();
        eventually(|| {
            emitted_for(&emitted, "watch")
                .iter()
                .any(|p| p["index"] == "token" && p["data"].is_string())
        })
        .await;
    }

    /// Concurrent connects share one transport.
    #[tokio::test]
    async fn test_concurrent_connects_share_transport() {
        let relay = MemoryRelay::new();
        let device = client(&relay);

        let (a, b) = tokio::join!(device.connect(), device.connect());
        a.unwrap();
        b.unwrap();

        assert_eq!(relay.peer_count(), 1);
        assert!(device.is_connected());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
