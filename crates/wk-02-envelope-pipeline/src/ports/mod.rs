//! Ports layer

pub mod inbound;
pub mod outbound;

pub use inbound::{EnvelopeSink, StoreProcessingTracker};
pub use outbound::{EventPublisher, FilterRegistryApi};
