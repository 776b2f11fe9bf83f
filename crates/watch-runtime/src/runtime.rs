//! Demo runtime: one relay, a sensor device and a dashboard device.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::json;
use tokio::sync::watch;
use tracing::{error, info, warn};
use watch_sdk::{FileStore, MemoryRelay, WatchClient, WatchConfig};

/// Index the sensor watches and the dashboard looks at.
pub const DEMO_INDEX: &str = "temperature";

pub struct WatchRuntime {
    relay: MemoryRelay,
    sensor: Arc<WatchClient>,
    dashboard: Arc<WatchClient>,
    received: Arc<AtomicU64>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WatchRuntime {
    /// Create both devices. Each keeps its identity under its own
    /// subdirectory of the configured data dir.
    pub fn new(config: WatchConfig) -> Result<Self> {
        let relay = MemoryRelay::new();

        let sensor = Self::device(&config, "sensor", &relay)?;
        let dashboard = Self::device(&config, "dashboard", &relay)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            relay,
            sensor: Arc::new(sensor),
            dashboard: Arc::new(dashboard),
            received: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
            shutdown_rx,
        })
    }

    fn device(config: &WatchConfig, name: &str, relay: &MemoryRelay) -> Result<WatchClient> {
        let store = FileStore::open(config.data_dir.join(name))
            .with_context(|| format!("Failed to open identity store for {name}"))?;
        WatchClient::init(config.clone(), &store, Arc::new(relay.clone()))
            .with_context(|| format!("Failed to initialize {name}"))
    }

    /// Connect both devices and start the sensor feed.
    pub async fn start(&self) -> Result<()> {
        info!("===========================================");
        info!("  Watch Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let received = self.received.clone();
        self.dashboard.look(DEMO_INDEX, move |value| {
            let count = received.fetch_add(1, Ordering::Relaxed) + 1;
            info!(index = DEMO_INDEX, value = %value, count, "Dashboard received");
        });

        self.sensor.connect().await.context("Sensor failed to connect")?;
        self.dashboard
            .connect()
            .await
            .context("Dashboard failed to connect")?;

        info!(
            peers = self.relay.peer_count(),
            sensor = %self.sensor.identity().short_device_id(),
            dashboard = %self.dashboard.identity().short_device_id(),
            "Devices connected"
        );

        self.spawn_sensor_feed();
        Ok(())
    }

    fn spawn_sensor_feed(&self) {
        let sensor = self.sensor.clone();
        let period = sensor.config().watch_time;
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reading = 20.0 + rand::thread_rng().gen_range(0.0..5.0);
                        sensor.watch(DEMO_INDEX, json!({ "celsius": reading }));
                    }
                    _ = shutdown.changed() => {
                        info!("Sensor feed stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Number of values the dashboard has received.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Stop the feed, let both drain loops finish, then release the devices.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        for (name, device) in [("sensor", &self.sensor), ("dashboard", &self.dashboard)] {
            if let Err(e) = device.scheduler().halt().await {
                warn!(device = name, error = %e, "Drain loop did not stop cleanly");
            }
        }
        self.sensor.shutdown();
        self.dashboard.shutdown();
        info!(received = self.received(), "Shutdown complete");
    }
}
