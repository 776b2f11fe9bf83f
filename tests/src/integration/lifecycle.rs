//! # Lifecycle Integration Tests
//!
//! Bootstrap, connection loss and recovery, and shutdown of whole clients.
//!
//! ## Scenarios Tested:
//!
//! 1. **Fatal bootstrap**: a missing app id leaves no trace
//! 2. **Outage**: offline pauses the pipeline and drops watches
//! 3. **Recovery**: online resumes with a fresh heartbeat and re-announced looks
//! 4. **Shutdown**: the drain loop exits and announces it
//! 5. **Persistent identity**: a device id survives restarts on disk

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tempfile::TempDir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use watch_bus::EventBus;
    use watch_sdk::domain::channels::{HEARTBEAT_INDEX, STATUS_OFFLINE, WATCH_BREAK};
    use watch_sdk::service::DEVICE_ID_KEY;
    use watch_sdk::{
        ConfigError, FileStore, IdentityStore, MemoryRelay, MemoryStore, SchedulerPhase,
        WatchClient, WatchConfig, WatchError, WatchEvent,
    };

    use crate::integration::fixtures::{client, config, eventually, DEADLINE};

    /// Count fires on `channel`.
    fn counter(bus: &EventBus<WatchEvent>, channel: &str) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        bus.subscribe(channel, move |_: &WatchEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[tokio::test]
    async fn test_missing_app_id_prevents_start() {
        let relay = MemoryRelay::new();
        let store = MemoryStore::new();
        let config = WatchConfig::from_query("watch.js?watchTime=100").unwrap();

        let result = WatchClient::init(config, &store, Arc::new(relay.clone()));

        assert!(matches!(
            result,
            Err(WatchError::Configuration(ConfigError::MissingAppId))
        ));
        assert_eq!(store.get(DEVICE_ID_KEY).unwrap(), None);
        assert_eq!(relay.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_before_connect_is_dropped() {
        let relay = MemoryRelay::new();
        let device = client(&relay);

        device.watch("temp", 1);
        assert_eq!(device.scheduler().phase(), SchedulerPhase::Paused);
        assert!(device.scheduler().entry("temp").is_none());

        device.connect().await.unwrap();
        device.watch("temp", 2);
        assert_eq!(device.scheduler().entry("temp").unwrap().data, json!(2));
    }

    #[tokio::test]
    async fn test_outage_pauses_and_recovery_resumes() {
        let relay = MemoryRelay::new();
        let device = client(&relay);
        device.connect().await.unwrap();

        let first_heartbeat = device.scheduler().entry(HEARTBEAT_INDEX).unwrap().data;

        let offline = counter(device.bus(), STATUS_OFFLINE);
        relay.disconnect_all();
        eventually(|| offline.load(Ordering::SeqCst) == 1).await;

        assert_eq!(device.scheduler().phase(), SchedulerPhase::Paused);
        assert!(!device.is_connected());
        device.watch("during-outage", true);
        assert!(device.scheduler().entry("during-outage").is_none());

        relay.reconnect_all();
        let scheduler = device.scheduler().clone();
        eventually(move || scheduler.phase() == SchedulerPhase::Active).await;

        let second_heartbeat = device.scheduler().entry(HEARTBEAT_INDEX).unwrap().data;
        assert_ne!(first_heartbeat, second_heartbeat);
        assert!(device.is_connected());
    }

    /// Interest dropped by the relay during an outage is restored on resume.
    #[tokio::test]
    async fn test_looks_survive_reconnect() {
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

        relay.disconnect_all();
        assert_eq!(relay.interested("price"), 0);
        relay.reconnect_all();
        eventually(|| relay.interested("price") == 1).await;

        let received = timeout(DEADLINE, async {
            loop {
                sensor.watch("price", 10);
                tokio::select! {
                    value = rx.recv() => return value,
                    _ = tokio::time::sleep(Duration::from_millis(10)) => {}
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(received, Some(json!(10)));
    }

    #[tokio::test]
    async fn test_unlook_stops_delivery_and_reannouncement() {
        let relay = MemoryRelay::new();
        let dashboard = client(&relay);
        let id = dashboard.look("price", |_| {});
        dashboard.connect().await.unwrap();
        eventually(|| relay.interested("price") == 1).await;

        assert!(dashboard.unlook("price", &id));
        assert!(dashboard.looks().indices().is_empty());

        relay.disconnect_all();
        relay.reconnect_all();
        let looks = dashboard.looks().clone();
        eventually(move || looks.is_online()).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(relay.interested("price"), 0);
    }

    #[tokio::test]
    async fn test_shutdown_breaks_drain_loop() {
        let relay = MemoryRelay::new();
        let device = client(&relay);
        device.connect().await.unwrap();
        let scheduler = device.scheduler().clone();
        eventually(|| scheduler.is_looping()).await;

        let breaks = counter(device.bus(), WATCH_BREAK);

        // Halt first so the break is observed before the bus is disposed.
        scheduler.halt().await.unwrap();
        assert_eq!(breaks.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_looping());

        device.shutdown();
        assert!(device.bus().is_disposed());
        assert_eq!(scheduler.phase(), SchedulerPhase::Stopped);
        eventually(|| relay.peer_count() == 0).await;
    }

    /// Reconnecting to an earlier relay rebinds the device to it.
    #[tokio::test]
    async fn test_switch_relay_and_back() {
        let relay = MemoryRelay::new();
        let device = client(&relay);

        device.connect_to("memory://primary").await.unwrap();
        device.connect_to("memory://backup").await.unwrap();
        device.connect_to("memory://primary").await.unwrap();

        assert_eq!(device.connected_url().as_deref(), Some("memory://primary"));
        assert!(device.is_connected());
        eventually(|| relay.peer_count() == 1).await;

        device.shutdown();
        assert!(device.connect_to("memory://primary").await.is_err());
    }

    #[tokio::test]
    async fn test_device_id_persists_on_disk() {
        let dir = TempDir::new().unwrap();
        let relay = MemoryRelay::new();

        let first = {
            let store = FileStore::open(dir.path()).unwrap();
            let device = WatchClient::init(config(), &store, Arc::new(relay.clone())).unwrap();
            device.identity().device_id.clone()
        };
        let second = {
            let store = FileStore::open(dir.path()).unwrap();
            let device = WatchClient::init(config(), &store, Arc::new(relay.clone())).unwrap();
            device.identity().device_id.clone()
        };

        assert_eq!(first.len(), 256);
        assert_eq!(first, second);
    }
}
