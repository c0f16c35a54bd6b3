//! Ports layer

pub mod inbound;
pub mod outbound;

pub use inbound::FilterManagerApi;
pub use outbound::{FilterProtocol, MockFilterProtocol, Subscription};
