//! Inbound (Driving) ports.
//!
//! The host-facing surface of the SDK.

use serde_json::Value;
use watch_bus::ListenerId;

/// Watch/look API used by host applications.
pub trait WatchApi {
    /// Push a value under `index`. Dropped while offline or stopped.
    fn watch(&self, index: &str, data: Value);

    /// Subscribe to future values pushed by peers for `index`.
    fn look<F>(&self, index: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static;
}
