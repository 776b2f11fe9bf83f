//! # Watch Client
//!
//! Facade owning one bus, one scheduler and one look relay per device.
//!
//! ## Bootstrap
//!
//! 1. Validate configuration (a missing app id is fatal)
//! 2. Load or create the device identity
//! 3. Wire status signals, install the scheduler and look relay
//! 4. Fire `@watch:start` (the scheduler stays paused until online)
//! 5. [`WatchClient::connect`] loads the transport once and binds it

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use watch_bus::{EventBus, ListenerId};

use crate::adapters::{wire_status, ConnectionAdapter};
use crate::config::WatchConfig;
use crate::domain::channels::{WATCH_START, WATCH_STOP, WATCH_UPDATE};
use crate::domain::{ConfigError, Identity, TransportError, WatchError, WatchEvent};
use crate::ports::{IdentityStore, ResourceFetcher, TransportConnector, WatchApi};
use crate::service::look::LookRelay;
use crate::service::scheduler::WatchScheduler;
use crate::util::{LoadSlots, ResourceLoader};

/// Mount target recorded for the transport resource.
const TRANSPORT_TARGET: &str = "transport";

/// The transport currently bound to the bus and the URL it was loaded from.
struct Binding {
    url: String,
    adapter: ConnectionAdapter,
}

type AdapterSlot = Arc<Mutex<Option<Binding>>>;

/// Loads a transport through a connector and binds it to the client's bus.
struct TransportInstaller {
    connector: Arc<dyn TransportConnector>,
    bus: Arc<EventBus<WatchEvent>>,
    identity: Identity,
    adapter: AdapterSlot,
    slots: LoadSlots,
}

#[async_trait]
impl ResourceFetcher for TransportInstaller {
    async fn fetch(&self, url: &str, target: &str) -> Result<(), WatchError> {
        if self.bus.is_disposed() {
            return Err(TransportError::Closed.into());
        }
        let transport = self.connector.connect(url).await?;
        if self.bus.is_disposed() {
            return Err(TransportError::Closed.into());
        }

        // Release the previous binding first; both use the same listener ids.
        let previous = self.adapter.lock().take();
        if let Some(previous) = previous {
            if previous.url != url {
                self.slots.forget(&previous.url);
                info!(from = %previous.url, to = %url, "Transport replaced");
            }
            drop(previous);
        }

        let adapter = ConnectionAdapter::bind(self.bus.clone(), transport, self.identity.clone());
        *self.adapter.lock() = Some(Binding {
            url: url.to_string(),
            adapter,
        });
        info!(url = %url, target = %target, "Transport installed");
        Ok(())
    }
}

pub struct WatchClient {
    config: WatchConfig,
    identity: Identity,
    bus: Arc<EventBus<WatchEvent>>,
    scheduler: WatchScheduler,
    looks: LookRelay,
    loader: ResourceLoader,
    adapter: AdapterSlot,
}

impl WatchClient {
    /// Bootstrap the SDK. Fails without side effects if the configuration
    /// is invalid.
    pub fn init(
        config: WatchConfig,
        store: &dyn IdentityStore,
        connector: Arc<dyn TransportConnector>,
    ) -> Result<Self, WatchError> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Watch SDK not started");
            return Err(e.into());
        }
        let app_id = config.app_id().ok_or(ConfigError::MissingAppId)?;

        let identity = Identity::load_or_create(store, app_id)?;

        let bus = Arc::new(EventBus::new());
        wire_status(&bus);

        let scheduler = WatchScheduler::new(bus.clone(), &config);
        scheduler.install();

        let looks = LookRelay::new(bus.clone());
        looks.install();

        let adapter: AdapterSlot = Arc::new(Mutex::new(None));
        let slots = LoadSlots::default();
        let installer = Arc::new(TransportInstaller {
            connector,
            bus: bus.clone(),
            identity: identity.clone(),
            adapter: adapter.clone(),
            slots: slots.clone(),
        });
        let loader = ResourceLoader::with_slots(installer, slots);

        info!(
            app_id = %identity.app_id,
            device = %identity.short_device_id(),
            watch_time = ?config.watch_time,
            "Watch SDK initialized"
        );

        bus.fire(WATCH_START, &WatchEvent::Signal);

        Ok(Self {
            config,
            identity,
            bus,
            scheduler,
            looks,
            loader,
            adapter,
        })
    }

    /// Connect to the configured relay. Concurrent and repeated calls share
    /// one connection.
    pub async fn connect(&self) -> Result<(), WatchError> {
        let url = self.config.relay_url.clone();
        self.connect_to(&url).await
    }

    /// Connect to `url`, replacing any transport bound from another URL.
    /// Fails with [`TransportError::Closed`] after [`WatchClient::shutdown`].
    pub async fn connect_to(&self, url: &str) -> Result<(), WatchError> {
        self.loader.install(url, Some(TRANSPORT_TARGET), None).await
    }

    /// Offer `data` under `index`. Dropped unless the scheduler is active.
    pub fn watch(&self, index: &str, data: impl Into<Value>) {
        self.bus
            .fire(WATCH_UPDATE, &WatchEvent::update(index, data));
    }

    /// Receive values other devices watch under `index`.
    pub fn look<F>(&self, index: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.looks.look(index, callback)
    }

    pub fn unlook(&self, index: &str, id: &ListenerId) -> bool {
        self.looks.unlook(index, id)
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus<WatchEvent>> {
        &self.bus
    }

    #[must_use]
    pub fn scheduler(&self) -> &WatchScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn looks(&self) -> &LookRelay {
        &self.looks
    }

    /// Whether a transport is bound and currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.adapter
            .lock()
            .as_ref()
            .is_some_and(|binding| binding.adapter.transport().is_connected())
    }

    /// URL of the bound transport, if any.
    #[must_use]
    pub fn connected_url(&self) -> Option<String> {
        self.adapter.lock().as_ref().map(|binding| binding.url.clone())
    }

    /// Stop the scheduler, release the transport and dispose the bus.
    pub fn shutdown(&self) {
        if self.bus.is_disposed() {
            return;
        }
        self.bus.fire(WATCH_STOP, &WatchEvent::Signal);
        let binding = self.adapter.lock().take();
        drop(binding);
        self.loader.slots().clear();
        self.bus.dispose();
        info!("Watch SDK shut down");
    }
}

impl Drop for WatchClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl WatchApi for WatchClient {
    fn watch(&self, index: &str, data: Value) {
        WatchClient::watch(self, index, data);
    }

    fn look<F>(&self, index: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        WatchClient::look(self, index, callback)
    }
}
