//! Service layer: identity bootstrap, scheduler, look relay and the client
//! facade.

pub mod client;
pub mod identity;
pub mod look;
pub mod scheduler;

pub use client::WatchClient;
pub use identity::{APP_ID_KEY, DEVICE_ID_KEY, DEVICE_ID_LENGTH};
pub use look::LookRelay;
pub use scheduler::WatchScheduler;
