//! # Watch SDK
//!
//! Client-side telemetry: devices *watch* (push) values under string
//! indices and *look* (subscribe) at values other devices watch.
//!
//! ## Architecture
//!
//! ```text
//! host ──watch──→ @watch:update ──→ WatchScheduler ──@watch:sync──→ ConnectionAdapter ──→ relay
//! host ←─look──── @look#<index> ←── ConnectionAdapter ←── push ─────────────────────────── relay
//!                 @status:online/offline ──→ resume/pause scheduler and look relay
//! ```
//!
//! Every component talks through one [`watch_bus::EventBus`] per client;
//! none holds a reference to another.
//!
//! ## Layers
//!
//! - `domain`: channels, events, entries, state and errors
//! - `ports`: the host API and the transport, store and fetcher seams
//! - `adapters`: memory/file stores, the in-process relay, transport binding
//! - `service`: scheduler, look relay, identity and the [`WatchClient`] facade
//! - `util`: polling wait and the one-shot resource loader

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod util;

pub use adapters::{ConnectionAdapter, FileStore, MemoryRelay, MemoryStore, RelayConnection};
pub use config::WatchConfig;
pub use domain::{
    ConfigError, DrainOutcome, Identity, SchedulerPhase, SyncPackage, SyncRequest,
    TransportError, WatchError, WatchEvent,
};
pub use ports::{IdentityStore, Transport, TransportConnector, TransportEvent, WatchApi};
pub use service::{LookRelay, WatchClient, WatchScheduler};
pub use util::{wait, ResourceLoader};
