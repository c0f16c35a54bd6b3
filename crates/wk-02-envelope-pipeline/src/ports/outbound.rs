//! Outbound Ports (Driven Ports)
//!
//! The pipeline depends on two collaborators:
//! - the filter registry, for matching and storing envelopes
//! - the notification bus, for `EnvelopeAvailable` / `EnvelopeExpired`

pub use shared_bus::EventPublisher;
pub use wk_01_filter_registry::FilterRegistryApi;
