//! Payloads carried by the SDK's event bus.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Event payload for every channel in [`crate::domain::channels`].
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Payload-less lifecycle signal (start, stop, pause, online, ...).
    Signal,
    /// A value offered for an index.
    Update { index: String, data: Value },
    /// A sync request issued by the drain loop.
    Sync(SyncRequest),
    /// Interest in an index.
    Announce { index: String },
    /// A value pushed by the relay for a looked index.
    Push { index: String, data: Value },
    /// Transport-level failure.
    Error(String),
}

impl WatchEvent {
    pub fn update(index: impl Into<String>, data: impl Into<Value>) -> Self {
        Self::Update {
            index: index.into(),
            data: data.into(),
        }
    }
}

/// One-shot acknowledgement slot shared by every clone of a [`SyncRequest`].
///
/// The first `send` wins; later sends are ignored.
#[derive(Clone)]
pub struct Ack(Arc<Mutex<Option<oneshot::Sender<Value>>>>);

impl Ack {
    pub fn channel() -> (Self, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    /// Deliver the status. Returns false if already acknowledged or the
    /// requester is gone.
    pub fn send(&self, status: Value) -> bool {
        match self.0.lock().take() {
            Some(tx) => tx.send(status).is_ok(),
            None => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.lock().is_some()
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack")
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// A request to sync one buffered entry upstream.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub index: String,
    pub data: Value,
    ack: Ack,
}

impl SyncRequest {
    pub fn new(index: impl Into<String>, data: Value) -> (Self, oneshot::Receiver<Value>) {
        let (ack, rx) = Ack::channel();
        (
            Self {
                index: index.into(),
                data,
                ack,
            },
            rx,
        )
    }

    /// Report the delivery status back to the scheduler.
    pub fn acknowledge(&self, status: Value) -> bool {
        self.ack.send(status)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.ack.is_pending()
    }
}
