//! Adapters layer: concrete stores, the in-process relay and the
//! transport-to-bus binding.

pub mod connection;
pub mod relay;
pub mod store;

pub use connection::{wire_status, ConnectionAdapter};
pub use relay::{MemoryRelay, RelayConnection};
pub use store::{FileStore, MemoryStore};
