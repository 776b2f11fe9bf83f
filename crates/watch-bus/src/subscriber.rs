//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: listener identifiers,
//! callback type and the explicit unsubscribe operations.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The listener backing an await was removed before the channel fired.
    #[error("Event bus closed")]
    Closed,
}

/// Callback registered under a channel.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifier of one listener within a channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(String);

impl ListenerId {
    /// Wrap an explicit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh 8-character identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(crate::token::generate_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListenerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ListenerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Scope of an unsubscribe request.
///
/// Removing an absent channel or id is always a no-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsubscribe {
    /// Every listener on every channel.
    All,
    /// Every listener on one channel; the channel entry is removed too.
    Channel(String),
    /// A single listener.
    One(String, ListenerId),
}

impl Unsubscribe {
    pub fn channel(channel: impl Into<String>) -> Self {
        Self::Channel(channel.into())
    }

    pub fn one(channel: impl Into<String>, id: ListenerId) -> Self {
        Self::One(channel.into(), id)
    }
}
