//! Domain layer: the envelope cache state machine.

pub mod cache;
pub mod record;

pub use cache::{EnvelopeCache, Observation};
pub use record::{CachedRecord, ProcessingState, Timestamp};
