//! Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{ContentFilter, FilterId};

use crate::domain::FilterStats;
use crate::error::ManagerError;

/// Application-facing API of the filter health manager.
///
/// Calls only enqueue a command for the event loop; convergence happens
/// asynchronously.
#[async_trait]
pub trait FilterManagerApi: Send + Sync {
    /// Start maintaining peer subscriptions for an installed filter.
    async fn add_filter(
        &self,
        filter_id: FilterId,
        criteria: ContentFilter,
    ) -> Result<(), ManagerError>;

    /// Tear down every subscription of a filter.
    async fn remove_filter(&self, filter_id: FilterId) -> Result<(), ManagerError>;

    /// Current subscription health of every tracked filter.
    async fn stats(&self) -> Result<FilterStats, ManagerError>;
}
