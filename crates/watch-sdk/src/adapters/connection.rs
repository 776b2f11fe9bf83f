//! Connection adapter: glue between a [`Transport`] and the SDK's bus.
//!
//! ## Status wiring
//!
//! ```text
//! @status:online  → @watch:resume + @look:resume
//! @status:offline → @watch:pause  + @look:pause
//! ```
//!
//! ## Transport binding
//!
//! - transport events become `@status:*` fires and pushes become
//!   `@look#<index>` fires
//! - `@watch:sync` requests are emitted as `watch` packages and acknowledged
//!   with the relay's status
//! - `@look:update` announcements are emitted as `look`

use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, trace, warn};
use watch_bus::{EventBus, ListenerId};
use watch_telemetry::{CONNECTION_TRANSITIONS, LOOK_PUSHES};

use crate::adapters::relay::{EMIT_LOOK, EMIT_WATCH};
use crate::domain::channels::{
    look_channel, LOOK_PAUSE, LOOK_RESUME, LOOK_UPDATE, STATUS_ERROR, STATUS_OFFLINE,
    STATUS_ONLINE, WATCH_PAUSE, WATCH_RESUME, WATCH_SYNC,
};
use crate::domain::{Identity, LookAnnouncement, SyncPackage, WatchError, WatchEvent};
use crate::ports::{Transport, TransportEvent};

/// Listener id for the status wiring.
pub const STATUS_LISTENER: &str = "status-wiring";

/// Listener id for the transport binding.
pub const ADAPTER_LISTENER: &str = "connection-adapter";

/// Map online/offline signals onto the scheduler and look relay.
pub fn wire_status(bus: &Arc<EventBus<WatchEvent>>) {
    let weak: Weak<EventBus<WatchEvent>> = Arc::downgrade(bus);
    bus.subscribe_with_id(STATUS_ONLINE, STATUS_LISTENER, move |_: &WatchEvent| {
        if let Some(bus) = weak.upgrade() {
            info!("Connection online");
            CONNECTION_TRANSITIONS.with_label_values(&["online"]).inc();
            bus.fire(WATCH_RESUME, &WatchEvent::Signal);
            bus.fire(LOOK_RESUME, &WatchEvent::Signal);
        }
    });

    let weak: Weak<EventBus<WatchEvent>> = Arc::downgrade(bus);
    bus.subscribe_with_id(STATUS_OFFLINE, STATUS_LISTENER, move |_: &WatchEvent| {
        if let Some(bus) = weak.upgrade() {
            info!("Connection offline");
            CONNECTION_TRANSITIONS.with_label_values(&["offline"]).inc();
            bus.fire(WATCH_PAUSE, &WatchEvent::Signal);
            bus.fire(LOOK_PAUSE, &WatchEvent::Signal);
        }
    });
}

/// A transport bound to a bus. Unbinds on drop.
pub struct ConnectionAdapter {
    bus: Arc<EventBus<WatchEvent>>,
    transport: Arc<dyn Transport>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionAdapter {
    /// Bind `transport` to `bus`.
    ///
    /// Must be called within a Tokio runtime. If the transport is already
    /// connected, `@status:online` fires before this returns.
    pub fn bind(
        bus: Arc<EventBus<WatchEvent>>,
        transport: Arc<dyn Transport>,
        identity: Identity,
    ) -> Self {
        let handle = Handle::current();

        let sync_transport = transport.clone();
        let sync_handle = handle.clone();
        bus.subscribe_with_id(WATCH_SYNC, ADAPTER_LISTENER, move |event: &WatchEvent| {
            let WatchEvent::Sync(request) = event else {
                return;
            };
            let package = SyncPackage::new(&identity, request.index.clone(), request.data.clone());
            let transport = sync_transport.clone();
            let request = request.clone();

            sync_handle.spawn(async move {
                let result = match serde_json::to_value(&package) {
                    Ok(payload) => transport
                        .emit(EMIT_WATCH, payload)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match result {
                    Ok(status) => {
                        trace!(index = %request.index, "Sync acknowledged");
                        request.acknowledge(status);
                    }
                    // Dropping the request reports the failure to the scheduler.
                    Err(reason) => {
                        let err = WatchError::SyncFailed {
                            index: request.index.clone(),
                            reason,
                        };
                        debug!(error = %err, "Sync emit failed");
                    }
                }
            });
        });

        let look_transport = transport.clone();
        let look_handle = handle.clone();
        bus.subscribe_with_id(LOOK_UPDATE, ADAPTER_LISTENER, move |event: &WatchEvent| {
            let WatchEvent::Announce { index } = event else {
                return;
            };
            let transport = look_transport.clone();
            let announcement = LookAnnouncement {
                index: index.clone(),
            };

            look_handle.spawn(async move {
                let index = announcement.index.clone();
                let result = match serde_json::to_value(&announcement) {
                    Ok(payload) => transport
                        .emit(EMIT_LOOK, payload)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match result {
                    Ok(_) => debug!(index = %index, "Look announced"),
                    Err(reason) => {
                        debug!(index = %index, reason = %reason, "Look announcement not delivered")
                    }
                }
            });
        });

        let events = BroadcastStream::new(transport.events());
        let pump = handle.spawn(pump_events(bus.clone(), events));

        if transport.is_connected() {
            bus.fire(STATUS_ONLINE, &WatchEvent::Signal);
        }

        info!(connected = transport.is_connected(), "Transport bound");
        Self {
            bus,
            transport,
            pump: Mutex::new(Some(pump)),
        }
    }

    /// Detach from the bus and stop forwarding transport events.
    pub fn unbind(&self) {
        let Some(pump) = self.pump.lock().take() else {
            return;
        };
        pump.abort();

        let id = ListenerId::from(ADAPTER_LISTENER);
        self.bus.unsubscribe_one(WATCH_SYNC, &id);
        self.bus.unsubscribe_one(LOOK_UPDATE, &id);
        debug!("Transport unbound");
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.pump.lock().is_some()
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

impl Drop for ConnectionAdapter {
    fn drop(&mut self) {
        self.unbind();
    }
}

async fn pump_events(bus: Arc<EventBus<WatchEvent>>, mut events: BroadcastStream<TransportEvent>) {
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => forward(&bus, event),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "Transport events lagged");
            }
        }
    }
    debug!("Transport event stream closed");
}

fn forward(bus: &EventBus<WatchEvent>, event: TransportEvent) {
    match event {
        TransportEvent::Connected => {
            bus.fire(STATUS_ONLINE, &WatchEvent::Signal);
        }
        TransportEvent::Disconnected => {
            bus.fire(STATUS_OFFLINE, &WatchEvent::Signal);
        }
        TransportEvent::Error(reason) => {
            warn!(reason = %reason, "Transport error");
            CONNECTION_TRANSITIONS.with_label_values(&["error"]).inc();
            bus.fire(STATUS_OFFLINE, &WatchEvent::Signal);
            bus.fire(STATUS_ERROR, &WatchEvent::Error(reason));
        }
        TransportEvent::Push { index, data } => {
            LOOK_PUSHES.inc();
            let channel = look_channel(&index);
            bus.fire(&channel, &WatchEvent::Push { index, data });
        }
    }
}
