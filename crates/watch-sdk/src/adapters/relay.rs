//! In-process relay.
//!
//! Routes `watch` packages to every connected peer that announced interest
//! (`look`) in the package's index. Each peer gets a [`RelayConnection`]
//! implementing [`Transport`]; tests and the runtime drive its lifecycle with
//! [`RelayConnection::disconnect`], [`RelayConnection::reconnect`] and
//! [`RelayConnection::fail`].
//!
//! A peer's interests are dropped when it disconnects, like a socket server
//! forgetting room membership; clients re-announce on resume.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::domain::{LookAnnouncement, SyncPackage, TransportError};
use crate::ports::{Transport, TransportConnector, TransportEvent};

/// Buffered transport events per peer.
const EVENT_CAPACITY: usize = 256;

/// Event name for sync packages.
pub const EMIT_WATCH: &str = "watch";

/// Event name for look announcements.
pub const EMIT_LOOK: &str = "look";

struct Peer {
    events: broadcast::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
    interests: HashSet<String>,
}

#[derive(Default)]
struct RelayState {
    peers: RwLock<HashMap<Uuid, Peer>>,
}

impl RelayState {
    fn deliver(&self, index: &str, data: &Value) -> usize {
        let peers = self.peers.read();
        let mut delivered = 0;
        for peer in peers.values() {
            if !peer.connected.load(Ordering::SeqCst) || !peer.interests.contains(index) {
                continue;
            }
            let push = TransportEvent::Push {
                index: index.to_string(),
                data: data.clone(),
            };
            if peer.events.send(push).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    fn register_interest(&self, peer: Uuid, index: String) {
        if let Some(peer) = self.peers.write().get_mut(&peer) {
            peer.interests.insert(index);
        }
    }

    /// Flip a peer's link state and report the transition on its events.
    fn set_link(&self, id: Uuid, event: TransportEvent) {
        let mut peers = self.peers.write();
        let Some(peer) = peers.get_mut(&id) else {
            return;
        };

        let online = matches!(event, TransportEvent::Connected);
        let was_online = peer.connected.swap(online, Ordering::SeqCst);
        if !online {
            peer.interests.clear();
        }
        // Error is always reported; up/down only on an actual change.
        if was_online != online || matches!(event, TransportEvent::Error(_)) {
            debug!(peer = %id, event = ?event, "Relay link changed");
            let _ = peer.events.send(event);
        }
    }

    fn ids(&self) -> Vec<Uuid> {
        self.peers.read().keys().copied().collect()
    }
}

/// Shared relay hub. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    state: Arc<RelayState>,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connected peer.
    pub fn connect_peer(&self) -> Arc<RelayConnection> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let id = Uuid::new_v4();

        self.state.peers.write().insert(
            id,
            Peer {
                events: events.clone(),
                connected: connected.clone(),
                interests: HashSet::new(),
            },
        );
        debug!(peer = %id, "Relay peer connected");

        Arc::new(RelayConnection {
            id,
            state: self.state.clone(),
            events,
            connected,
        })
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.peers.read().len()
    }

    /// Drop every peer's link, as during a relay outage.
    pub fn disconnect_all(&self) {
        for id in self.state.ids() {
            self.state.set_link(id, TransportEvent::Disconnected);
        }
    }

    pub fn reconnect_all(&self) {
        for id in self.state.ids() {
            self.state.set_link(id, TransportEvent::Connected);
        }
    }

    /// Number of connected peers interested in `index`.
    #[must_use]
    pub fn interested(&self, index: &str) -> usize {
        self.state
            .peers
            .read()
            .values()
            .filter(|p| p.connected.load(Ordering::SeqCst) && p.interests.contains(index))
            .count()
    }
}

#[async_trait]
impl TransportConnector for MemoryRelay {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError> {
        debug!(url = %url, "Connecting to in-process relay");
        let connection: Arc<dyn Transport> = self.connect_peer();
        Ok(connection)
    }
}

/// One peer's connection to a [`MemoryRelay`].
pub struct RelayConnection {
    id: Uuid,
    state: Arc<RelayState>,
    events: broadcast::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
}

impl RelayConnection {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Drop the connection. Interests are forgotten.
    pub fn disconnect(&self) {
        self.state.set_link(self.id, TransportEvent::Disconnected);
    }

    pub fn reconnect(&self) {
        self.state.set_link(self.id, TransportEvent::Connected);
    }

    /// Fail the connection with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        self.state.set_link(self.id, TransportEvent::Error(reason.into()));
    }
}

#[async_trait]
impl Transport for RelayConnection {
    async fn emit(&self, event: &str, payload: Value) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match event {
            EMIT_WATCH => {
                let package: SyncPackage = serde_json::from_value(payload)
                    .map_err(|e| TransportError::Rejected(e.to_string()))?;
                let delivered = self.state.deliver(&package.index, &package.data);
                trace!(peer = %self.id, index = %package.index, delivered, "Package relayed");
                Ok(json!({ "delivered": delivered }))
            }
            EMIT_LOOK => {
                let announcement: LookAnnouncement = serde_json::from_value(payload)
                    .map_err(|e| TransportError::Rejected(e.to_string()))?;
                let index = announcement.index;
                self.state.register_interest(self.id, index.clone());
                trace!(peer = %self.id, index = %index, "Interest registered");
                Ok(json!({ "index": index }))
            }
            other => Err(TransportError::UnknownEvent(other.to_string())),
        }
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.state.peers.write().remove(&self.id);
    }
}
