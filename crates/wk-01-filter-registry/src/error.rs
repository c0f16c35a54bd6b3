//! Error types for the Filter Registry subsystem

use thiserror::Error;

/// Errors returned when installing or addressing a filter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Content topic set contains an empty topic")]
    EmptyContentTopic,

    #[error("Filter store capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Invalid pubsub topic: {0:?}")]
    InvalidPubsubTopic(String),

    #[error("Too many filters installed: {count} >= {max}")]
    TooManyFilters { count: usize, max: usize },

    #[error("Filter not found: {0}")]
    FilterNotFound(String),
}
