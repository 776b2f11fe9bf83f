//! Outbound (Driven) ports.
//!
//! The SDK's external collaborators: the real-time transport, identity
//! storage and resource fetching.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::{TransportError, WatchError};

/// Lifecycle and inbound traffic reported by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Error(String),
    /// The relay pushed a value for an index this device looks at.
    Push { index: String, data: Value },
}

/// Request/acknowledge transport to the relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Emit `event` with `payload`; the `Ok` value is the relay's
    /// acknowledgement status.
    async fn emit(&self, event: &str, payload: Value) -> Result<Value, TransportError>;

    /// Subscribe to lifecycle events and inbound pushes.
    fn events(&self) -> broadcast::Receiver<TransportEvent>;

    fn is_connected(&self) -> bool;
}

/// Opens transports to a relay URL.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Arc<dyn Transport>, TransportError>;
}

/// Persistent key-value storage for the device identity.
pub trait IdentityStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, WatchError>;

    fn set(&self, key: &str, value: &str) -> Result<(), WatchError>;
}

/// Loads one external resource into a target.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, target: &str) -> Result<(), WatchError>;
}
