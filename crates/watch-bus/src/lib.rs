//! # Watch Bus - Channel-Keyed Event Bus
//!
//! Every pipeline of the watch SDK (scheduler, look relay, connection
//! adapter) talks through this bus instead of calling each other directly.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Component A │                    │  Component B │
//! │              │   fire(channel)    │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe(channel)
//! ```
//!
//! ## Semantics
//!
//! - Channels are opaque string keys.
//! - Listeners run synchronously, in registration order, over a snapshot.
//! - A panicking listener never prevents the others from running.
//! - `until` turns the next fire on a channel into an awaitable.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod publisher;
pub mod subscriber;
pub mod token;

// Re-export main types
pub use publisher::EventBus;
pub use subscriber::{BusError, Listener, ListenerId, Unsubscribe};
pub use token::{generate_id, token, DEFAULT_TOKEN_LENGTH, DEFAULT_TOKEN_RADIX};
