//! # WK-02 Envelope Pipeline
//!
//! Envelope cache and dispatch queue: every envelope the node receives,
//! whatever its source, passes through here exactly once.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): `EnvelopeCache` state machine, no I/O
//! - **Ports Layer** (`ports/`):
//!   - `EnvelopeSink`: Driving port used by every producer
//!   - `StoreProcessingTracker`: Store-query bookkeeping
//!   - `FilterRegistryApi`, `EventPublisher`: Driven ports
//! - **Service Layer** (`service`): `EnvelopePipeline`
//!
//! ## Guarantees
//!
//! - At most one dispatch-to-filters pass per hash that matched a filter.
//! - Duplicates are cheap: one cache lookup and a counter.
//! - The dispatch queue is bounded; producers wait when it is full.
//!
//! ```text
//! relay / filter / store / send
//!            │
//!            ▼
//!   on_new_envelope ──dup──→ (drop)
//!            │ new
//!            ├── process_immediately ──→ notify_watchers
//!            └── queue ──→ worker ─────→ notify_watchers
//!                                             │
//!                                   EnvelopeAvailable (bus)
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use config::PipelineConfig;
pub use domain::ProcessingState;
pub use error::PipelineError;
pub use ports::{EnvelopeSink, StoreProcessingTracker};
pub use service::EnvelopePipeline;
