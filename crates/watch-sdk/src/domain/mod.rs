//! Domain layer: state machine, entries, events and errors.

pub mod channels;
pub mod entities;
pub mod errors;
pub mod events;
pub mod state;

pub use entities::{Identity, LookAnnouncement, SyncPackage, WatchEntry};
pub use errors::{ConfigError, TransportError, WatchError};
pub use events::{Ack, SyncRequest, WatchEvent};
pub use state::{DrainOutcome, SchedulerPhase, SchedulerState};
