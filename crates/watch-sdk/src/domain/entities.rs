//! Watch entries, identity and wire records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Latest buffered value for one index.
///
/// Overwritten in place on every accepted update; `status` survives updates
/// and only changes when a sync is acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEntry {
    pub index: String,
    pub data: Value,
    pub updated_at: Instant,
    pub status: Option<Value>,
}

impl WatchEntry {
    pub fn new(index: impl Into<String>, data: Value, now: Instant) -> Self {
        Self {
            index: index.into(),
            data,
            updated_at: now,
            status: None,
        }
    }

    /// Replace the value and refresh the timestamp.
    pub fn touch(&mut self, data: Value, now: Instant) {
        self.data = data;
        self.updated_at = now;
    }

    /// Time since the last update.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated_at)
    }

    /// Whether the entry was updated within `window` of `now` (inclusive).
    #[must_use]
    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        self.idle_for(now) <= window
    }
}

/// The pair identifying this device to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub app_id: String,
    pub device_id: String,
}

/// Wire record for one sync round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPackage {
    pub app_id: String,
    pub device_id: String,
    pub index: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl SyncPackage {
    pub fn new(identity: &Identity, index: impl Into<String>, data: Value) -> Self {
        Self {
            app_id: identity.app_id.clone(),
            device_id: identity.device_id.clone(),
            index: index.into(),
            data,
            status: None,
        }
    }
}

/// Outbound interest announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookAnnouncement {
    pub index: String,
}
