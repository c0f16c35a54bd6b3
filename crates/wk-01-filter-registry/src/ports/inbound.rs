//! Inbound Ports (Driving Ports)
//!
//! The API the application and the envelope pipeline use to reach the
//! filter registry.

use shared_types::{Envelope, FilterId};

use crate::domain::{Filter, FilterSnapshot};
use crate::error::FilterError;

/// Filter registry API (Driving Port)
///
/// All methods are synchronous and safe to call concurrently.
pub trait FilterRegistryApi: Send + Sync {
    /// Register a filter. Every call yields a fresh id.
    fn install(&self, filter: Filter) -> Result<FilterId, FilterError>;

    /// Remove a filter. Returns false if the id is unknown.
    fn uninstall(&self, id: &FilterId) -> bool;

    /// Snapshot of an installed filter.
    fn get(&self, id: &FilterId) -> Option<FilterSnapshot>;

    /// Append the envelope to every matching filter's store.
    ///
    /// Returns true iff at least one filter matched.
    fn notify_watchers(&self, envelope: &Envelope) -> bool;

    /// Drain a filter's store, oldest first.
    fn pop_messages(&self, id: &FilterId) -> Result<Vec<Envelope>, FilterError>;

    /// Empty every filter's store. Filters stay installed.
    fn clear_messages(&self);
}
