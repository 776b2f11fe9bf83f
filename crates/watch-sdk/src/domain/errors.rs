//! SDK error types.

use std::time::Duration;
use thiserror::Error;
use watch_bus::BusError;

/// Top-level SDK error.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Fatal: the SDK refuses to initialize.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// A polling wait exceeded its deadline.
    #[error("wait timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A single sync request failed. Absorbed by the drain cycle.
    #[error("sync of index {index:?} failed: {reason}")]
    SyncFailed { index: String, reason: String },

    /// Identity storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid resource url {0:?}")]
    InvalidResource(String),

    #[error("resource {0} failed to load")]
    ResourceFailed(String),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl From<std::io::Error> for WatchError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `appId` is absent or blank.
    #[error("invalid app id: set appId (e.g. ?appId=XXXX or WATCH_APP_ID)")]
    MissingAppId,

    #[error("watch time must be greater than zero")]
    InvalidWatchTime,

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Errors reported by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("unknown event {0:?}")]
    UnknownEvent(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport closed")]
    Closed,
}
