//! # WK-01 Filter Registry
//!
//! In-memory table of the application's installed message filters.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): Pure logic, no I/O
//!   - `Filter`: Install-time criteria and validation
//!   - `MessageStore`: Bounded per-filter store, evicts least recent
//!   - `TopicIndex`: pubsub topic -> content topic -> filter ids
//!
//! - **Ports Layer** (`ports/`): `FilterRegistryApi` (driving port)
//!
//! - **Service Layer** (`service`): `FilterRegistry`
//!
//! ## Matching
//!
//! A filter matches an envelope when the pubsub topics are equal and either
//! the filter lists the envelope's content topic or lists no content topics
//! at all.
//!
//! ## Usage Example
//!
//! ```ignore
//! use wk_01_filter_registry::{Filter, FilterRegistry, FilterRegistryApi};
//!
//! let registry = FilterRegistry::default();
//! let id = registry.install(Filter::new("/waku/2/rs/16/32", ["/app/1/chat/proto"]))?;
//! registry.notify_watchers(&envelope);
//! let messages = registry.pop_messages(&id)?;
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use config::RegistryConfig;
pub use domain::{Filter, FilterSnapshot};
pub use error::FilterError;
pub use ports::FilterRegistryApi;
pub use service::FilterRegistry;
