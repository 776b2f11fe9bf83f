//! Ports layer (hexagonal architecture).

pub mod inbound;
pub mod outbound;

pub use inbound::WatchApi;
pub use outbound::{
    IdentityStore, ResourceFetcher, Transport, TransportConnector, TransportEvent,
};
