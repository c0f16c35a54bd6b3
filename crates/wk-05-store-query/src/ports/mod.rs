//! Ports layer

pub mod inbound;
pub mod outbound;

pub use inbound::StoreQueryApi;
pub use outbound::{MockStore, StoreProtocol};
